use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const SETTINGS_ROOT: &str = ".memecrate";
const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3001";
pub const DEFAULT_DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8899";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cluster {
    Devnet,
    Mainnet,
    Local,
}

impl Cluster {
    pub fn dir_name(self) -> &'static str {
        match self {
            Cluster::Devnet => "devnet",
            Cluster::Mainnet => "mainnet",
            Cluster::Local => "local",
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Cluster::Devnet => DEFAULT_DEVNET_RPC_URL,
            Cluster::Mainnet => DEFAULT_MAINNET_RPC_URL,
            Cluster::Local => DEFAULT_LOCAL_RPC_URL,
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cluster::Devnet => "Devnet",
            Cluster::Mainnet => "Mainnet",
            Cluster::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Connection settings remembered for one cluster. Every field is optional so
/// that older or hand-edited files still load.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(default)]
    pub saved_at: Option<String>,
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub wallet_dir: Option<String>,
}

/// Values the client actually runs with once defaults, the stored record and
/// command line overrides have been layered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub cluster: Cluster,
    pub backend_url: String,
    pub rpc_url: String,
    pub wallet: Option<String>,
    pub wallet_dir: Option<String>,
}

impl ResolvedSettings {
    pub fn defaults(cluster: Cluster) -> Self {
        Self {
            cluster,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            rpc_url: cluster.default_rpc_url().to_string(),
            wallet: None,
            wallet_dir: None,
        }
    }

    /// Layers `record` over the current values. Absent fields leave the
    /// current value untouched.
    pub fn overlay(mut self, record: &SettingsRecord) -> Self {
        if let Some(url) = &record.backend_url {
            self.backend_url = url.clone();
        }
        if let Some(url) = &record.rpc_url {
            self.rpc_url = url.clone();
        }
        if record.wallet.is_some() {
            self.wallet = record.wallet.clone();
        }
        if record.wallet_dir.is_some() {
            self.wallet_dir = record.wallet_dir.clone();
        }
        self
    }

    pub fn to_record(&self) -> SettingsRecord {
        SettingsRecord {
            saved_at: Some(Utc::now().to_rfc3339()),
            backend_url: Some(self.backend_url.clone()),
            rpc_url: Some(self.rpc_url.clone()),
            wallet: self.wallet.clone(),
            wallet_dir: self.wallet_dir.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(cluster: Cluster) -> Result<Self> {
        Self::at(SETTINGS_ROOT, cluster)
    }

    pub fn at(root: impl AsRef<Path>, cluster: Cluster) -> Result<Self> {
        let path = ensure_store(root.as_ref(), cluster)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<SettingsRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: &SettingsRecord) -> Result<()> {
        write_record(&self.path, record)
    }

    /// Defaults for `cluster` with the stored record, if any, applied on top.
    pub fn resolve(&self, cluster: Cluster) -> Result<ResolvedSettings> {
        let base = ResolvedSettings::defaults(cluster);
        Ok(match self.load()? {
            Some(record) => base.overlay(&record),
            None => base,
        })
    }
}

fn ensure_store(root: &Path, cluster: Cluster) -> Result<PathBuf> {
    let cluster_dir = root.join(cluster.dir_name());
    if !cluster_dir.exists() {
        fs::create_dir_all(&cluster_dir).with_context(|| {
            format!(
                "Failed to create settings directory {}",
                cluster_dir.display()
            )
        })?;
    }

    let file_path = cluster_dir.join(SETTINGS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create settings file for {} at {:?}",
                cluster, file_path
            )
        })?;
        file.write_all(b"")
            .with_context(|| format!("Failed to initialize settings file for {}", cluster))?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<SettingsRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read settings file")?;
    if data.is_empty() || data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<SettingsRecord>(&data)
        .map(Some)
        .map_err(|e| anyhow!("Failed to parse settings JSON: {e}"))
}

fn write_record(path: impl AsRef<Path>, record: &SettingsRecord) -> Result<()> {
    let json =
        serde_json::to_vec_pretty(record).context("Failed to serialize settings record")?;
    fs::write(path.as_ref(), json).context("Failed to write settings file")?;
    Ok(())
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn load__returns_none_for_freshly_created_store() {
        // given
        let dir = TempDir::new("settings_fresh").unwrap();
        let store = SettingsStore::at(dir.path(), Cluster::Devnet).unwrap();

        // when
        let loaded = store.load().unwrap();

        // then
        assert!(loaded.is_none());
        assert!(store.path().ends_with("devnet/settings.json"));
    }

    #[test]
    fn save__persists_record_that_load_reads_back() {
        // given
        let dir = TempDir::new("settings_save").unwrap();
        let store = SettingsStore::at(dir.path(), Cluster::Local).unwrap();
        let record = SettingsRecord {
            saved_at: Some("2025-01-01T00:00:00Z".to_string()),
            backend_url: Some("http://backend:4000".to_string()),
            rpc_url: None,
            wallet: Some("player".to_string()),
            wallet_dir: None,
        };

        // when
        store.save(&record).unwrap();

        // then
        assert_eq!(store.load().unwrap(), Some(record));
    }

    #[test]
    fn resolve__layers_stored_fields_over_cluster_defaults() {
        // given
        let dir = TempDir::new("settings_resolve").unwrap();
        let store = SettingsStore::at(dir.path(), Cluster::Mainnet).unwrap();
        store
            .save(&SettingsRecord {
                backend_url: Some("https://crates.example".to_string()),
                ..SettingsRecord::default()
            })
            .unwrap();

        // when
        let resolved = store.resolve(Cluster::Mainnet).unwrap();

        // then
        assert_eq!(resolved.backend_url, "https://crates.example");
        assert_eq!(resolved.rpc_url, DEFAULT_MAINNET_RPC_URL);
        assert_eq!(resolved.wallet, None);
    }

    #[test]
    fn load__rejects_malformed_json() {
        // given
        let dir = TempDir::new("settings_malformed").unwrap();
        let store = SettingsStore::at(dir.path(), Cluster::Devnet).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();

        // when
        let result = store.load();

        // then
        assert!(result.is_err());
    }
}
