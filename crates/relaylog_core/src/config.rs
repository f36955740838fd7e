//! Replication buffer configuration.

/// Configuration for a replication buffer.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Suppress all writer activity (the reader can still drain).
    pub binlog_disabled: bool,

    /// Stop emitting new running-checksum state.
    pub disable_crc32_write: bool,

    /// Stop verifying against pre-existing checksum values.
    pub disable_crc32_check: bool,

    /// Suppress recording (and asserting) rotation timestamps.
    pub disable_timestamp_write: bool,

    /// Batch checksum extension and garbage collection less often.
    pub flush_rarely: bool,

    /// Ceiling on buffered-but-unconsumed bytes (backpressure).
    pub max_write_threshold: u64,

    /// Minimum byte budget worth asking the writer for.
    pub min_write_threshold: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            binlog_disabled: false,
            disable_crc32_write: false,
            disable_crc32_check: false,
            disable_timestamp_write: false,
            flush_rarely: false,
            max_write_threshold: 1024 * 1024, // 1 MiB
            min_write_threshold: 4 * 1024,    // 4 KiB
        }
    }
}

impl BufferConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether writer activity is suppressed.
    #[must_use]
    pub const fn binlog_disabled(mut self, value: bool) -> Self {
        self.binlog_disabled = value;
        self
    }

    /// Sets whether new checksum state is emitted.
    #[must_use]
    pub const fn disable_crc32_write(mut self, value: bool) -> Self {
        self.disable_crc32_write = value;
        self
    }

    /// Sets whether pre-existing checksums are verified.
    #[must_use]
    pub const fn disable_crc32_check(mut self, value: bool) -> Self {
        self.disable_crc32_check = value;
        self
    }

    /// Sets whether rotation timestamps are recorded.
    #[must_use]
    pub const fn disable_timestamp_write(mut self, value: bool) -> Self {
        self.disable_timestamp_write = value;
        self
    }

    /// Sets whether checksum extension and GC are batched.
    #[must_use]
    pub const fn flush_rarely(mut self, value: bool) -> Self {
        self.flush_rarely = value;
        self
    }

    /// Sets the backpressure ceiling.
    #[must_use]
    pub const fn max_write_threshold(mut self, bytes: u64) -> Self {
        self.max_write_threshold = bytes;
        self
    }

    /// Sets the minimum worthwhile read size.
    #[must_use]
    pub const fn min_write_threshold(mut self, bytes: u64) -> Self {
        self.min_write_threshold = bytes;
        self
    }

    /// Returns `true` when checksum evaluation is disabled entirely.
    ///
    /// Derived flag: the running CRC is maintained as long as either the
    /// write side or the check side still wants it. Only when both are
    /// disabled does the buffer skip CRC extension altogether.
    #[must_use]
    pub const fn crc32_eval_disabled(&self) -> bool {
        self.disable_crc32_write && self.disable_crc32_check
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BufferConfig::default();
        assert!(!config.binlog_disabled);
        assert!(!config.flush_rarely);
        assert!(!config.crc32_eval_disabled());
        assert!(config.max_write_threshold > config.min_write_threshold);
    }

    #[test]
    fn builder_pattern() {
        let config = BufferConfig::new()
            .binlog_disabled(true)
            .flush_rarely(true)
            .max_write_threshold(8192)
            .min_write_threshold(512);

        assert!(config.binlog_disabled);
        assert!(config.flush_rarely);
        assert_eq!(config.max_write_threshold, 8192);
        assert_eq!(config.min_write_threshold, 512);
    }

    #[test]
    fn crc_eval_requires_both_flags() {
        let write_only = BufferConfig::new().disable_crc32_write(true);
        assert!(!write_only.crc32_eval_disabled());

        let check_only = BufferConfig::new().disable_crc32_check(true);
        assert!(!check_only.crc32_eval_disabled());

        let both = BufferConfig::new()
            .disable_crc32_write(true)
            .disable_crc32_check(true);
        assert!(both.crc32_eval_disabled());
    }
}
