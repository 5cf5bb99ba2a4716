use std::path::PathBuf;

/// A.D.A. data directory (~/.ada)
pub fn ada_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".ada")
}

/// config.json path
pub fn config_json_path() -> PathBuf {
    ada_dir().join("config.json")
}

/// Encrypted preference file path
pub fn prefs_path() -> PathBuf {
    ada_dir().join("prefs.json")
}

/// Preference encryption key file path
pub fn prefs_key_path() -> PathBuf {
    ada_dir().join(".prefs_key")
}

/// Ensure the ada directory exists
pub fn ensure_ada_dir() -> std::io::Result<PathBuf> {
    let dir = ada_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
