use deploy_core::CommodityId;
use deploy_runtime::AuditSink;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Appends audit lines to `<dir>/<commodity>.txt`.
pub struct FileAuditLog {
    dir: PathBuf,
}

impl FileAuditLog {
    pub fn create(dir: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn path_for(&self, commodity: &CommodityId) -> PathBuf {
        self.dir.join(format!("{commodity}.txt"))
    }
}

impl AuditSink for FileAuditLog {
    fn append(&mut self, commodity: &CommodityId, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(commodity))?;
        writeln!(file, "{line}")
    }
}
