use directories::ProjectDirs;
use std::path::PathBuf;

/// Hub directories following the XDG layout
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/roomhub)
    pub config: PathBuf,

    /// Data directory (~/.local/share/roomhub)
    pub data: PathBuf,

    /// Config file path
    pub config_file: PathBuf,

    /// Room identity map, keyed by controller address
    pub identity_file: PathBuf,

    /// Append-only command log
    pub audit_log_file: PathBuf,
}

impl Directories {
    /// Standard XDG paths, or a `roomhub` directory under the system temp dir
    /// when no home directory can be determined.
    #[must_use]
    pub fn new() -> Self {
        let Some(project) = ProjectDirs::from("", "", "roomhub") else {
            return Self::with_base(std::env::temp_dir().join("roomhub"));
        };

        let config = project.config_dir().to_path_buf();
        let data = project.data_dir().to_path_buf();

        Self {
            config_file: config.join("config.json"),
            identity_file: data.join("rooms.json"),
            audit_log_file: data.join("commands.log"),
            config,
            data,
        }
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.json"),
            identity_file: base.join("rooms.json"),
            audit_log_file: base.join("commands.log"),
            config: base.clone(),
            data: base,
        }
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.data)?;
        Ok(())
    }
}

impl Default for Directories {
    fn default() -> Self {
        Self::new()
    }
}
