//! Runtime configuration.

/// Tunables for a runtime instance.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Longest string that is interned.
    pub short_string_max: usize,
    /// Initial and minimum bucket count of the string table. Power of two.
    pub min_string_table_size: usize,
    /// Bucket count ceiling of the string table. Power of two.
    pub max_string_table_size: usize,
    /// Interned-string count that forces a full collection.
    pub max_strings: usize,
    pub string_cache_sets: usize,
    pub string_cache_ways: usize,
    /// Fixed hash seed. `None` draws a random one.
    pub hash_seed: Option<u32>,
    /// Byte budget for heap objects and string-table buckets.
    pub memory_limit: Option<usize>,
    /// Work units per incremental collector step.
    pub gc_step_size: usize,
    /// Percent of live objects to allocate before the next cycle starts.
    pub gc_pause: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            short_string_max: 40,
            min_string_table_size: 128,
            max_string_table_size: 1 << 30,
            max_strings: i32::MAX as usize,
            string_cache_sets: 53,
            string_cache_ways: 2,
            hash_seed: None,
            memory_limit: None,
            gc_step_size: 64,
            gc_pause: 200,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `LUMA_*` environment variables. Unparsable
    /// values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = get("LUMA_HASH_SEED").and_then(|s| parse_u32(&s)) {
            cfg.hash_seed = Some(v);
        }
        if let Some(v) = get("LUMA_SHORT_STRING_MAX").and_then(|s| s.trim().parse().ok()) {
            cfg.short_string_max = v;
        }
        if let Some(v) = get("LUMA_MEMORY_LIMIT").and_then(|s| s.trim().parse().ok()) {
            cfg.memory_limit = Some(v);
        }
        if let Some(v) = get("LUMA_GC_PAUSE").and_then(|s| s.trim().parse().ok()) {
            cfg.gc_pause = v;
        }
        cfg
    }

    /// Clamp inconsistent settings into a usable configuration.
    pub(crate) fn normalized(mut self) -> Self {
        self.min_string_table_size = self.min_string_table_size.max(4).next_power_of_two();
        self.max_string_table_size = self
            .max_string_table_size
            .max(self.min_string_table_size)
            .next_power_of_two();
        self.short_string_max = self.short_string_max.min(u8::MAX as usize);
        self.string_cache_sets = self.string_cache_sets.max(1);
        self.string_cache_ways = self.string_cache_ways.max(1);
        self.gc_step_size = self.gc_step_size.max(1);
        self.gc_pause = self.gc_pause.max(100);
        self
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_known_keys() {
        let cfg = RuntimeConfig::from_lookup(|k| match k {
            "LUMA_HASH_SEED" => Some("0x2a".to_string()),
            "LUMA_MEMORY_LIMIT" => Some("4096".to_string()),
            "LUMA_GC_PAUSE" => Some("nope".to_string()),
            _ => None,
        });
        assert_eq!(cfg.hash_seed, Some(42));
        assert_eq!(cfg.memory_limit, Some(4096));
        assert_eq!(cfg.gc_pause, 200);
        assert_eq!(cfg.short_string_max, 40);
    }

    #[test]
    fn normalization_rounds_table_sizes() {
        let cfg = RuntimeConfig {
            min_string_table_size: 100,
            max_string_table_size: 50,
            ..Default::default()
        }
        .normalized();
        assert_eq!(cfg.min_string_table_size, 128);
        assert_eq!(cfg.max_string_table_size, 128);
    }
}
