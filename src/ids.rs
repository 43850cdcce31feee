use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Random v4 UUIDs, unique across every unit without coordination.
    #[default]
    Random,
    /// `"<prefix>_<n>"` counters; each unit gets its own prefix.
    Sequential,
}

/// Fresh identifier source. Safe to share between threads.
#[derive(Debug)]
pub enum IdGen {
    Random,
    Sequential { prefix: String, counter: AtomicU64 },
}

impl IdGen {
    pub fn sequential(prefix: impl Into<String>) -> Self {
        IdGen::Sequential {
            prefix: sanitize(&prefix.into()),
            counter: AtomicU64::new(0),
        }
    }

    pub fn fresh(&self) -> String {
        match self {
            IdGen::Random => Uuid::new_v4().simple().to_string(),
            IdGen::Sequential { prefix, counter } => {
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                format!("{}_{}", prefix, n)
            }
        }
    }
}

/// Hands out sequential prefixes that stay distinct after sanitizing.
#[derive(Debug, Default)]
pub struct PrefixPool {
    taken: HashSet<String>,
}

impl PrefixPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequential(&mut self, unit: &str) -> IdGen {
        let base = sanitize(unit);
        let mut prefix = base.clone();
        let mut suffix = 1;
        while !self.taken.insert(prefix.clone()) {
            suffix += 1;
            prefix = format!("{}_{}", base, suffix);
        }
        IdGen::sequential(prefix)
    }
}

fn sanitize(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "id".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sequential_ids_are_namespaced_per_unit() {
        let stage = IdGen::sequential("Stage");
        let sprite = IdGen::sequential("my sprite");
        assert_eq!(stage.fresh(), "Stage_1");
        assert_eq!(stage.fresh(), "Stage_2");
        assert_eq!(sprite.fresh(), "my_sprite_1");
    }

    #[test]
    fn pooled_prefixes_never_repeat() {
        let mut pool = PrefixPool::new();
        let first = pool.sequential("my sprite");
        let second = pool.sequential("my_sprite");
        let third = pool.sequential("my_sprite_2");
        assert_eq!(first.fresh(), "my_sprite_1");
        assert_eq!(second.fresh(), "my_sprite_2_1");
        assert_eq!(third.fresh(), "my_sprite_2_2_1");
    }

    #[test]
    fn random_ids_do_not_repeat() {
        let ids = IdGen::Random;
        let seen: HashSet<String> = (0..200).map(|_| ids.fresh()).collect();
        assert_eq!(seen.len(), 200);
        assert!(seen.iter().all(|id| id.len() == 32));
    }
}
