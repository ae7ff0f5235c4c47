use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use solana_sdk::signer::keypair::{
    Keypair,
    read_keypair_file,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const KEYPAIR_EXTENSION: &str = "json";

/// A keypair file the player can sign with, named after its file stem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("solana"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(KEYPAIR_EXTENSION) {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// Reads a keypair stored as a JSON array of secret key bytes.
pub fn load_keypair(descriptor: &WalletDescriptor) -> Result<Keypair> {
    read_keypair_file(&descriptor.path).map_err(|e| {
        eyre!(
            "Wallet '{}' at {} is not a valid keypair file: {e}",
            descriptor.name,
            descriptor.path.display()
        )
    })
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::{
        Signer,
        keypair::write_keypair_file,
    };
    use tempdir::TempDir;

    #[test]
    fn list_wallets__returns_sorted_json_keypairs_only() {
        // given
        let dir = TempDir::new("wallets_list").unwrap();
        write_keypair_file(&Keypair::new(), dir.path().join("zed.json")).unwrap();
        write_keypair_file(&Keypair::new(), dir.path().join("alice.json")).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not a wallet").unwrap();
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "zed"]);
    }

    #[test]
    fn list_wallets__missing_directory_is_empty() {
        // given
        let dir = TempDir::new("wallets_missing").unwrap();
        let missing = dir.path().join("nope");

        // when
        let wallets = list_wallets(&missing).unwrap();

        // then
        assert!(wallets.is_empty());
    }

    #[test]
    fn find_wallet__reports_unknown_name() {
        // given
        let dir = TempDir::new("wallets_find").unwrap();
        write_keypair_file(&Keypair::new(), dir.path().join("alice.json")).unwrap();

        // when
        let err = find_wallet(dir.path(), "bob").unwrap_err();

        // then
        assert!(err.to_string().contains("Wallet 'bob' not found"));
    }

    #[test]
    fn load_keypair__reads_back_written_keypair() {
        // given
        let dir = TempDir::new("wallets_load").unwrap();
        let keypair = Keypair::new();
        write_keypair_file(&keypair, dir.path().join("player.json")).unwrap();
        let descriptor = find_wallet(dir.path(), "player").unwrap();

        // when
        let loaded = load_keypair(&descriptor).unwrap();

        // then
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn load_keypair__rejects_garbage_file() {
        // given
        let dir = TempDir::new("wallets_garbage").unwrap();
        fs::write(dir.path().join("broken.json"), b"{\"not\": \"bytes\"}").unwrap();
        let descriptor = find_wallet(dir.path(), "broken").unwrap();

        // when
        let result = load_keypair(&descriptor);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn resolve_wallet_dir__expands_tilde() {
        // given
        let home = std::env::var("HOME").unwrap();

        // when
        let dir = resolve_wallet_dir(Some("~/keys")).unwrap();

        // then
        assert_eq!(dir, PathBuf::from(home).join("keys"));
    }
}
