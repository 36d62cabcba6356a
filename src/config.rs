use serde::Deserialize;

use crate::disk::DiskType;
use crate::error::Result;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub disk_type: DiskType,
    /// Number of frames owned by the buffer pool.
    pub pool_size: usize,
    /// The k in LRU-K.
    pub replacer_k: usize,
    /// Pairs per page table bucket before a split.
    pub bucket_size: usize,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("disk_type", "memory")?
            .set_default("pool_size", 64)?
            .set_default("replacer_k", 2)?
            .set_default("bucket_size", 32)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("PAGEPOOL"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> Result<()> {
        let cfg = Config::new("")?;
        assert_eq!(LogLevel::Debug, cfg.log_level);
        assert_eq!(DiskType::Memory, cfg.disk_type);
        assert_eq!(64, cfg.pool_size);
        assert_eq!(2, cfg.replacer_k);
        assert_eq!(32, cfg.bucket_size);
        Ok(())
    }
}
