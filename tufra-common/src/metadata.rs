//! Ceremony building blocks: the fixed role model of the repository
//! service, loading of signing keys from disk and initialization of the
//! signed root metadata that anchors the repository. All metadata schema
//! and signing primitives come from `tough`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::num::NonZeroU64;
use std::path::Path;

use chrono::{Duration, Utc};
use olpc_cjson::CanonicalFormatter;
use ring::rand::SecureRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tough::schema::{RoleKeys, RoleType};
use tough::sign::{parse_keypair, Sign};

pub use tough::schema::decoded::{Decoded, Hex};
pub use tough::schema::key::Key;
pub use tough::schema::{Root, Signature, Signed};

use crate::error::Error;

/// TUF specification version written into generated metadata.
pub const SPEC_VERSION: &str = "1.0.31";

/// Roles the repository service knows about. `bins` is the delegated
/// hash-bin role family, the other four are the TUF top-level roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Targets,
    Snapshot,
    Timestamp,
    Bins,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Root,
        Role::Targets,
        Role::Snapshot,
        Role::Timestamp,
        Role::Bins,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Targets => "targets",
            Role::Snapshot => "snapshot",
            Role::Timestamp => "timestamp",
            Role::Bins => "bins",
        }
    }

    /// Roles whose keys stay offline after the ceremony.
    pub fn is_offline(self) -> bool {
        matches!(self, Role::Root | Role::Targets)
    }

    /// The top-level role type, `None` for the delegated bins role.
    pub fn role_type(self) -> Option<RoleType> {
        match self {
            Role::Root => Some(RoleType::Root),
            Role::Targets => Some(RoleType::Targets),
            Role::Snapshot => Some(RoleType::Snapshot),
            Role::Timestamp => Some(RoleType::Timestamp),
            Role::Bins => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunable settings of one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSettings {
    /// metadata expiration in days
    pub expiration: u32,
    pub num_of_keys: usize,
    pub threshold: u64,
    pub offline_keys: bool,
}

/// The ceremony defaults the service recommends.
pub fn default_role_settings(role: Role) -> RoleSettings {
    match role {
        Role::Root | Role::Targets => RoleSettings {
            expiration: 365,
            num_of_keys: 2,
            threshold: 1,
            offline_keys: true,
        },
        Role::Snapshot | Role::Timestamp | Role::Bins => RoleSettings {
            expiration: 1,
            num_of_keys: 1,
            threshold: 1,
            offline_keys: false,
        },
    }
}

/// Default number of delegated hash bins.
pub const DEFAULT_BINS: u32 = 8;
/// Largest accepted number of delegated hash bins.
pub const MAX_BINS: u32 = 16384;

/// Whether a bins count is acceptable: a power of two within bounds.
pub fn valid_bins_count(bins: u32) -> bool {
    (1..=MAX_BINS).contains(&bins) && bins.is_power_of_two()
}

/// A signing key loaded from disk.
pub struct LoadedKey {
    pub filename: String,
    pub keyid: Decoded<Hex>,
    pub public: Key,
    pub signer: Box<dyn Sign>,
}

impl fmt::Debug for LoadedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedKey")
            .field("filename", &self.filename)
            .field("keyid", &self.keyid)
            .finish()
    }
}

/// Working state of one role during the ceremony.
#[derive(Debug)]
pub struct RoleConfig {
    pub settings: RoleSettings,
    pub keys: Vec<LoadedKey>,
    /// number of delegated hash bins, set on the targets role only
    pub bins: Option<u32>,
}

impl RoleConfig {
    pub fn new(role: Role) -> Self {
        RoleConfig {
            settings: default_role_settings(role),
            keys: Vec::new(),
            bins: (role == Role::Targets).then_some(DEFAULT_BINS),
        }
    }

    pub fn keyids(&self) -> Vec<String> {
        self.keys.iter().map(|key| keyid_hex(&key.keyid)).collect()
    }
}

/// Load a signing key from `path`. Encrypted PKCS#8 files are decrypted
/// with `password` before they are handed to `tough`.
pub fn load_signing_key(path: &Path, password: Option<&str>) -> Result<LoadedKey, Error> {
    let data = std::fs::read(path)?;
    let pem = decrypt_if_needed(path, &data, password)?;
    let signer = parse_keypair(&pem).map_err(|err| Error::KeyLoad {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let public = signer.tuf_key();
    let keyid = key_id(&public)?;
    Ok(LoadedKey {
        filename: path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string(),
        keyid,
        public,
        signer: Box::new(signer),
    })
}

/// Whether the file at `path` holds an encrypted PKCS#8 document.
pub fn key_is_encrypted(data: &[u8]) -> bool {
    std::str::from_utf8(data)
        .map(|text| text.contains("ENCRYPTED PRIVATE KEY"))
        .unwrap_or(false)
}

fn decrypt_if_needed(path: &Path, data: &[u8], password: Option<&str>) -> Result<Vec<u8>, Error> {
    if !key_is_encrypted(data) {
        return Ok(data.to_vec());
    }
    let password = password.ok_or_else(|| Error::KeyLoad {
        path: path.to_path_buf(),
        reason: "key is encrypted, a password is required".to_string(),
    })?;
    let key_error = |reason: String| Error::KeyLoad {
        path: path.to_path_buf(),
        reason,
    };
    let (label, der) =
        pem_rfc7468::decode_vec(data).map_err(|err| key_error(err.to_string()))?;
    if label != "ENCRYPTED PRIVATE KEY" {
        return Err(key_error(format!("unexpected PEM label {label:?}")));
    }
    let encrypted = pkcs8::EncryptedPrivateKeyInfo::try_from(der.as_slice())
        .map_err(|err| key_error(err.to_string()))?;
    let document = encrypted
        .decrypt(password)
        .map_err(|_| key_error("decryption failed, check the password".to_string()))?;
    let pem = pem_rfc7468::encode_string(
        "PRIVATE KEY",
        pem_rfc7468::LineEnding::LF,
        document.as_bytes(),
    )
    .map_err(|err| key_error(err.to_string()))?;
    Ok(pem.into_bytes())
}

/// Hex display form of a key id.
pub fn keyid_hex(keyid: &Decoded<Hex>) -> String {
    hex::encode(keyid.as_ref())
}

/// The TUF key id: sha256 over the canonical JSON form of the public key.
pub fn key_id(key: &Key) -> Result<Decoded<Hex>, Error> {
    let mut data = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
    key.serialize(&mut serializer)?;
    Ok(Decoded::from(Sha256::digest(&data).to_vec()))
}

/// Whether a key id is already registered with any role.
pub fn key_is_registered(roles: &BTreeMap<Role, RoleConfig>, keyid: &Decoded<Hex>) -> bool {
    roles
        .values()
        .any(|config| config.keys.iter().any(|key| &key.keyid == keyid))
}

/// Build the unsigned version 1 root metadata from the ceremony state.
/// Every top-level role is listed with its key ids and threshold.
pub fn initialize_root(roles: &BTreeMap<Role, RoleConfig>) -> Result<Signed<Root>, Error> {
    let root_config = roles
        .get(&Role::Root)
        .ok_or_else(|| Error::InvalidRoleConfig("root role is not configured".to_string()))?;

    let mut keys = HashMap::new();
    let mut role_keys = HashMap::new();
    for (role, config) in roles {
        let Some(role_type) = role.role_type() else {
            continue;
        };
        if config.keys.is_empty() {
            return Err(Error::InvalidRoleConfig(format!(
                "role {role} has no keys loaded"
            )));
        }
        let threshold = NonZeroU64::new(config.settings.threshold).ok_or_else(|| {
            Error::InvalidRoleConfig(format!("role {role} has a zero threshold"))
        })?;
        if config.settings.threshold > config.keys.len() as u64 {
            return Err(Error::InvalidRoleConfig(format!(
                "role {role} has a threshold larger than its number of keys"
            )));
        }
        let mut keyids = Vec::new();
        for key in &config.keys {
            keyids.push(key.keyid.clone());
            keys.insert(key.keyid.clone(), key.public.clone());
        }
        role_keys.insert(
            role_type,
            RoleKeys {
                keyids,
                threshold,
                _extra: HashMap::new(),
            },
        );
    }

    let root = Root {
        spec_version: SPEC_VERSION.to_string(),
        consistent_snapshot: true,
        version: NonZeroU64::new(1).expect("1 is non-zero"),
        expires: Utc::now() + Duration::days(i64::from(root_config.settings.expiration)),
        keys,
        roles: role_keys,
        _extra: HashMap::new(),
    };
    Ok(Signed {
        signed: root,
        signatures: Vec::new(),
    })
}

/// Serialize a role to the canonical JSON bytes that get signed.
pub fn canonical_bytes<T: Serialize>(signed: &T) -> Result<Vec<u8>, Error> {
    let mut data = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
    signed.serialize(&mut serializer)?;
    Ok(data)
}

/// Append one signature per signer to a signed role.
pub async fn sign_role<T: Serialize>(
    role: &mut Signed<T>,
    signers: &[&LoadedKey],
    rng: &(dyn SecureRandom + Sync),
) -> Result<(), Error> {
    let data = canonical_bytes(&role.signed)?;
    for key in signers {
        let sig = key
            .signer
            .sign(&data, rng)
            .await
            .map_err(|err| Error::Sign(err.to_string()))?;
        role.signatures.push(Signature {
            keyid: key.keyid.clone(),
            sig: sig.into(),
        });
    }
    Ok(())
}

/// Detached signature over pending metadata, produced for the
/// `metadata sign` flow.
pub async fn sign_pending_metadata(
    pending_signed: &Value,
    key: &LoadedKey,
    rng: &(dyn SecureRandom + Sync),
) -> Result<Signature, Error> {
    let data = canonical_bytes(pending_signed)?;
    let sig = key
        .signer
        .sign(&data, rng)
        .await
        .map_err(|err| Error::Sign(err.to_string()))?;
    Ok(Signature {
        keyid: key.keyid.clone(),
        sig: sig.into(),
    })
}

/// Role settings as they travel in the bootstrap payload. Only public key
/// ids are included, private key material never leaves the ceremony.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadRole {
    pub expiration: u32,
    pub num_of_keys: usize,
    pub threshold: u64,
    pub offline_keys: bool,
    pub keyids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_hash_prefixes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSettings {
    pub targets_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayloadSettings {
    pub roles: BTreeMap<String, PayloadRole>,
    pub service: ServiceSettings,
}

/// The `POST api/v1/bootstrap/` payload: the ceremony settings plus the
/// signed root metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootstrapPayload {
    pub settings: PayloadSettings,
    pub metadata: BTreeMap<String, Signed<Root>>,
}

impl BootstrapPayload {
    pub fn new(
        roles: &BTreeMap<Role, RoleConfig>,
        targets_base_url: String,
        root: Signed<Root>,
    ) -> Self {
        let mut payload_roles = BTreeMap::new();
        for (role, config) in roles {
            payload_roles.insert(
                role.name().to_string(),
                PayloadRole {
                    expiration: config.settings.expiration,
                    num_of_keys: config.settings.num_of_keys,
                    threshold: config.settings.threshold,
                    offline_keys: config.settings.offline_keys,
                    // offline keys are destroyed after the ceremony, their
                    // ids only ever appear inside the signed metadata
                    keyids: if config.settings.offline_keys {
                        Vec::new()
                    } else {
                        config.keyids()
                    },
                    number_hash_prefixes: config.bins,
                },
            );
        }
        BootstrapPayload {
            settings: PayloadSettings {
                roles: payload_roles,
                service: ServiceSettings { targets_base_url },
            },
            metadata: BTreeMap::from([("root".to_string(), root)]),
        }
    }
}

/// The `POST api/v1/metadata/` payload of a root update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub metadata: BTreeMap<String, Signed<Root>>,
}

impl UpdatePayload {
    pub fn new(root: Signed<Root>) -> Self {
        UpdatePayload {
            metadata: BTreeMap::from([("root".to_string(), root)]),
        }
    }
}

/// Extend the root expiration to `days` from now.
pub fn bump_expiration(root: &mut Root, days: u32) {
    root.expires = Utc::now() + Duration::days(i64::from(days));
}

/// Increment the root version for the next update round.
pub fn bump_version(root: &mut Root) -> Result<(), Error> {
    let next = root
        .version
        .get()
        .checked_add(1)
        .ok_or_else(|| Error::InvalidRoleConfig("root version overflow".to_string()))?;
    root.version = NonZeroU64::new(next).expect("incremented version is non-zero");
    Ok(())
}

fn root_role_mut(root: &mut Root) -> Result<&mut RoleKeys, Error> {
    root.roles
        .get_mut(&RoleType::Root)
        .ok_or_else(|| Error::InvalidRoleConfig("metadata without a root role".to_string()))
}

/// Change the signature threshold of the root role.
pub fn set_root_threshold(root: &mut Root, threshold: u64) -> Result<(), Error> {
    let role = root_role_mut(root)?;
    if threshold > role.keyids.len() as u64 {
        return Err(Error::InvalidRoleConfig(
            "threshold is larger than the number of root keys".to_string(),
        ));
    }
    role.threshold = NonZeroU64::new(threshold)
        .ok_or_else(|| Error::InvalidRoleConfig("threshold must be at least 1".to_string()))?;
    Ok(())
}

/// Register a new root signing key.
pub fn add_root_key(root: &mut Root, key: &LoadedKey) -> Result<(), Error> {
    let role = root_role_mut(root)?;
    if role.keyids.contains(&key.keyid) {
        return Err(Error::InvalidRoleConfig(
            "key is already a root key".to_string(),
        ));
    }
    role.keyids.push(key.keyid.clone());
    root.keys.insert(key.keyid.clone(), key.public.clone());
    Ok(())
}

/// Remove a root signing key. The role must keep enough keys to satisfy
/// its threshold.
pub fn remove_root_key(root: &mut Root, keyid: &Decoded<Hex>) -> Result<(), Error> {
    let role = root_role_mut(root)?;
    if !role.keyids.contains(keyid) {
        return Err(Error::InvalidRoleConfig("unknown root key".to_string()));
    }
    if (role.keyids.len() as u64) - 1 < role.threshold.get() {
        return Err(Error::InvalidRoleConfig(
            "removing this key would drop the role below its threshold".to_string(),
        ));
    }
    role.keyids.retain(|id| id != keyid);
    prune_unreferenced_keys(root);
    Ok(())
}

/// Swap the online key: timestamp and snapshot get the new key id.
pub fn rotate_online_key(root: &mut Root, key: &LoadedKey) -> Result<(), Error> {
    for role_type in [RoleType::Timestamp, RoleType::Snapshot] {
        let role = root.roles.get_mut(&role_type).ok_or_else(|| {
            Error::InvalidRoleConfig(format!("metadata without a {role_type:?} role"))
        })?;
        role.keyids = vec![key.keyid.clone()];
    }
    root.keys.insert(key.keyid.clone(), key.public.clone());
    prune_unreferenced_keys(root);
    Ok(())
}

fn prune_unreferenced_keys(root: &mut Root) {
    let referenced: Vec<Decoded<Hex>> = root
        .roles
        .values()
        .flat_map(|role| role.keyids.iter().cloned())
        .collect();
    root.keys.retain(|keyid, _| referenced.contains(keyid));
}

/// Key ids authorized to sign the root role, in their display form.
pub fn root_keyids(root: &Root) -> Vec<String> {
    root_keyids_decoded(root)
        .iter()
        .map(keyid_hex)
        .collect()
}

/// Key ids authorized to sign the root role.
pub fn root_keyids_decoded(root: &Root) -> Vec<Decoded<Hex>> {
    root.roles
        .get(&RoleType::Root)
        .map(|role| role.keyids.clone())
        .unwrap_or_default()
}

/// The root role signature threshold.
pub fn root_threshold(root: &Root) -> u64 {
    root.roles
        .get(&RoleType::Root)
        .map(|role| role.threshold.get())
        .unwrap_or(1)
}

/// Whether `keyid` is authorized to sign the root role.
pub fn is_root_signer(root: &Root, keyid: &Decoded<Hex>) -> bool {
    root.roles
        .get(&RoleType::Root)
        .map(|role| role.keyids.contains(keyid))
        .unwrap_or(false)
}

/// The `POST api/v1/metadata/sign/` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignPayload {
    pub role: String,
    pub signature: Signature,
}

/// The `POST api/v1/metadata/sign/delete` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignDeletePayload {
    pub role: String,
}

#[cfg(test)]
mod test {
    use ring::rand::SystemRandom;

    use super::*;

    fn write_generated_key(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let rng = SystemRandom::new();
        let document = ring::signature::Ed25519KeyPair::generate_pkcs8(&rng)
            .expect("failed to generate key");
        let pem = pem_rfc7468::encode_string(
            "PRIVATE KEY",
            pem_rfc7468::LineEnding::LF,
            document.as_ref(),
        )
        .expect("failed to encode PEM");
        let path = dir.path().join(name);
        std::fs::write(&path, pem).expect("failed to write key");
        path
    }

    fn ceremony_roles(dir: &tempfile::TempDir) -> BTreeMap<Role, RoleConfig> {
        let mut roles = BTreeMap::new();
        for role in Role::ALL {
            let mut config = RoleConfig::new(role);
            config.settings.num_of_keys = 1;
            let path = write_generated_key(dir, &format!("{role}.pem"));
            config
                .keys
                .push(load_signing_key(&path, None).expect("failed to load key"));
            roles.insert(role, config);
        }
        roles
    }

    #[test]
    fn test_role_defaults() {
        assert!(default_role_settings(Role::Root).offline_keys);
        assert!(!default_role_settings(Role::Timestamp).offline_keys);
        assert_eq!(default_role_settings(Role::Snapshot).expiration, 1);
        assert_eq!(default_role_settings(Role::Targets).num_of_keys, 2);
    }

    #[test]
    fn test_valid_bins_count() {
        assert!(valid_bins_count(1));
        assert!(valid_bins_count(8));
        assert!(valid_bins_count(16384));
        assert!(!valid_bins_count(0));
        assert!(!valid_bins_count(12));
        assert!(!valid_bins_count(32768));
    }

    #[test]
    fn test_load_signing_key_produces_stable_keyid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_generated_key(&dir, "root.pem");
        let first = load_signing_key(&path, None).expect("failed to load key");
        let second = load_signing_key(&path, None).expect("failed to load key");
        assert_eq!(first.keyid, second.keyid);
        assert_eq!(first.public, second.public);
    }

    #[test]
    fn test_key_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let roles = ceremony_roles(&dir);
        let known = roles[&Role::Root].keys[0].keyid.clone();
        assert!(key_is_registered(&roles, &known));
        let path = write_generated_key(&dir, "other.pem");
        let other = load_signing_key(&path, None).unwrap();
        assert!(!key_is_registered(&roles, &other.keyid));
    }

    #[tokio::test]
    async fn test_initialize_and_sign_root() {
        let dir = tempfile::tempdir().unwrap();
        let roles = ceremony_roles(&dir);
        let mut root = initialize_root(&roles).expect("failed to build root");
        assert_eq!(root.signed.version.get(), 1);
        assert_eq!(root.signed.spec_version, SPEC_VERSION);
        assert!(root.signed.consistent_snapshot);
        // four top-level roles, bins stays out of the root metadata
        assert_eq!(root.signed.roles.len(), 4);
        assert_eq!(root.signed.keys.len(), 4);

        let signers: Vec<&LoadedKey> = roles[&Role::Root].keys.iter().collect();
        let rng = SystemRandom::new();
        sign_role(&mut root, &signers, &rng)
            .await
            .expect("signing failed");
        assert_eq!(root.signatures.len(), 1);
        assert_eq!(root.signatures[0].keyid, roles[&Role::Root].keys[0].keyid);
    }

    #[test]
    fn test_initialize_root_rejects_oversized_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut roles = ceremony_roles(&dir);
        roles.get_mut(&Role::Root).unwrap().settings.threshold = 2;
        assert!(matches!(
            initialize_root(&roles),
            Err(Error::InvalidRoleConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_payload_has_no_private_material() {
        let dir = tempfile::tempdir().unwrap();
        let roles = ceremony_roles(&dir);
        let mut root = initialize_root(&roles).unwrap();
        let signers: Vec<&LoadedKey> = roles[&Role::Root].keys.iter().collect();
        sign_role(&mut root, &signers, &SystemRandom::new())
            .await
            .unwrap();
        let payload =
            BootstrapPayload::new(&roles, "https://example.org/downloads/".to_string(), root);
        let value = serde_json::to_value(&payload).expect("serialization failed");

        assert!(value["settings"]["roles"]["root"]["keyids"]
            .as_array()
            .unwrap()
            .is_empty());
        assert_eq!(
            value["settings"]["roles"]["bins"]["keyids"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            value["settings"]["roles"]["targets"]["number_hash_prefixes"],
            8
        );
        assert_eq!(
            value["settings"]["service"]["targets_base_url"],
            "https://example.org/downloads/"
        );
        assert!(value["metadata"]["root"]["signed"]["keys"].is_object());
        let dump = value.to_string();
        assert!(!dump.contains("PRIVATE"));
    }

    #[test]
    fn test_root_update_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let roles = ceremony_roles(&dir);
        let mut root = initialize_root(&roles).unwrap().signed;
        let original_expires = root.expires;

        bump_expiration(&mut root, 730);
        assert!(root.expires > original_expires);

        bump_version(&mut root).unwrap();
        assert_eq!(root.version.get(), 2);

        // a single root key cannot carry a threshold of two
        assert!(set_root_threshold(&mut root, 2).is_err());

        let path = write_generated_key(&dir, "second-root.pem");
        let second = load_signing_key(&path, None).unwrap();
        add_root_key(&mut root, &second).unwrap();
        assert_eq!(root_keyids(&root).len(), 2);
        set_root_threshold(&mut root, 2).unwrap();
        assert_eq!(root_threshold(&root), 2);
        assert!(is_root_signer(&root, &second.keyid));

        // threshold of two blocks key removal
        assert!(remove_root_key(&mut root, &second.keyid).is_err());
        set_root_threshold(&mut root, 1).unwrap();
        remove_root_key(&mut root, &second.keyid).unwrap();
        assert!(!is_root_signer(&root, &second.keyid));
        // the removed key is gone from the key map as well
        assert!(!root.keys.contains_key(&second.keyid));
    }

    #[test]
    fn test_rotate_online_key() {
        let dir = tempfile::tempdir().unwrap();
        let roles = ceremony_roles(&dir);
        let mut root = initialize_root(&roles).unwrap().signed;
        let old_timestamp_keyid = roles[&Role::Timestamp].keys[0].keyid.clone();

        let path = write_generated_key(&dir, "online.pem");
        let online = load_signing_key(&path, None).unwrap();
        rotate_online_key(&mut root, &online).unwrap();

        for role_type in [RoleType::Timestamp, RoleType::Snapshot] {
            assert_eq!(root.roles[&role_type].keyids, vec![online.keyid.clone()]);
        }
        assert!(!root.keys.contains_key(&old_timestamp_keyid));
        assert!(root.keys.contains_key(&online.keyid));
    }

    #[test]
    fn test_canonical_bytes_are_order_independent() {
        let a: Value = serde_json::json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(
            canonical_bytes(&a).unwrap(),
            canonical_bytes(&b).unwrap()
        );
    }
}
