//! Backend task state queries.

use anyhow::Result;

use crate::cli::{Cli, TaskInfoArgs};
use crate::commands::{api_client, resolve_settings};

pub async fn info(cli: &Cli, args: &TaskInfoArgs) -> Result<()> {
    let settings = resolve_settings(cli)?;
    let client = api_client(&settings)?;

    if args.watch {
        let task = client.task_status(&args.task_id, "Task status:", false).await?;
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        let task = client.get_task(&args.task_id).await?;
        println!("{}", serde_json::to_string_pretty(&task)?);
    }
    Ok(())
}
