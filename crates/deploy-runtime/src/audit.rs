use deploy_core::CommodityId;
use std::collections::BTreeMap;
use std::io;

/// Destination for per-commodity audit lines.
pub trait AuditSink {
    fn append(&mut self, commodity: &CommodityId, line: &str) -> io::Result<()>;
}

/// Discards every line.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn append(&mut self, _commodity: &CommodityId, _line: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps lines in memory, grouped by commodity.
#[derive(Clone, Debug, Default)]
pub struct MemoryAuditLog {
    lines: BTreeMap<CommodityId, Vec<String>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self, commodity: &str) -> &[String] {
        self.lines.get(commodity).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&mut self, commodity: &CommodityId, line: &str) -> io::Result<()> {
        self.lines
            .entry(commodity.clone())
            .or_default()
            .push(line.to_string());
        Ok(())
    }
}
