//! Leaky-bucket state and its atomic transition.
//!
//! The bucket fills by one unit per admitted request and drains continuously at
//! `drain_rate` units per second. A request is admitted when one more unit still fits
//! under `capacity`. Denied requests do not fill the bucket, but the leak they observe
//! is persisted all the same.

use fxgate_store::{Script, ScriptState};

const LAST_LEAK: &str = "last_leak";
const LEVEL: &str = "level";

/// Per-identity bucket state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Epoch second of the last leak.
    pub last_leak: i64,
    /// Current fill level. Fractional leakage is kept.
    pub level: f64,
}

impl BucketState {
    /// State of an identity never seen before.
    pub fn fresh(now: i64) -> Self {
        Self {
            last_leak: now,
            level: 0.0,
        }
    }

    /// Leak for the time elapsed since the last call, then try to admit one request.
    ///
    /// A clock that steps backwards leaks nothing.
    pub fn leak_and_admit(&mut self, now: i64, drain_rate: f64, capacity: f64) -> bool {
        let elapsed = now.saturating_sub(self.last_leak).max(0) as f64;
        let level = (self.level - elapsed * drain_rate).max(0.0);

        let admitted = level + 1.0 <= capacity;
        self.level = if admitted { level + 1.0 } else { level };
        self.last_leak = now;
        admitted
    }

    fn load(state: &ScriptState, now: i64) -> Self {
        let fresh = Self::fresh(now);
        Self {
            last_leak: state
                .get(LAST_LEAK)
                .map_or(fresh.last_leak, |t| *t as i64),
            level: state.get(LEVEL).copied().unwrap_or(fresh.level),
        }
    }

    fn save(&self, state: &mut ScriptState) {
        state.insert(LAST_LEAK.to_string(), self.last_leak as f64);
        state.insert(LEVEL.to_string(), self.level);
    }
}

fn apply(state: &mut ScriptState, args: &[f64]) -> bool {
    debug_assert!(
        args.len() >= 3,
        "leaky_bucket expects now, drain_rate and capacity, got {} args",
        args.len()
    );
    let &[now, drain_rate, capacity, ..] = args else {
        return false;
    };
    let now = now as i64;

    let mut bucket = BucketState::load(state, now);
    let admitted = bucket.leak_and_admit(now, drain_rate, capacity);
    bucket.save(state);
    admitted
}

/// Atomic leaky-bucket admission.
///
/// Arguments: `now` (epoch seconds), `drain_rate`, `capacity`. Returns whether the
/// request is admitted; the updated state is written either way.
pub const LEAKY_BUCKET: Script = Script {
    name: "leaky_bucket",
    lua: r#"
local now = tonumber(ARGV[1])
local drain_rate = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local state = redis.call('HMGET', KEYS[1], 'last_leak', 'level')
local last_leak = tonumber(state[1]) or now
local level = tonumber(state[2]) or 0

local elapsed = math.max(0, now - last_leak)
level = math.max(0, level - elapsed * drain_rate)

local admitted = 0
if level + 1 <= capacity then
  level = level + 1
  admitted = 1
end

redis.call('HSET', KEYS[1], 'last_leak', now, 'level', tostring(level))
if ttl > 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
end
return admitted
"#,
    apply,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fresh_bucket_admits() {
        let mut bucket = BucketState::fresh(100);
        assert!(bucket.leak_and_admit(100, 1.0, 1.0));
        assert_eq!(bucket.level, 1.0);
        assert!(!bucket.leak_and_admit(100, 1.0, 1.0));
    }

    #[test]
    fn test_fractional_leak_is_kept() {
        let mut bucket = BucketState {
            last_leak: 0,
            level: 3.0,
        };

        assert!(bucket.leak_and_admit(1, 0.5, 10.0));
        assert_eq!(bucket.level, 3.5);
        assert_eq!(bucket.last_leak, 1);
    }

    #[test]
    fn test_denied_request_still_records_leak() {
        let mut bucket = BucketState {
            last_leak: 0,
            level: 10.0,
        };

        assert!(!bucket.leak_and_admit(0, 0.25, 10.0));
        assert!(!bucket.leak_and_admit(1, 0.25, 10.0));
        assert_eq!(bucket.level, 9.75);
        assert_eq!(bucket.last_leak, 1);
    }

    #[test]
    fn test_clock_step_back_leaks_nothing() {
        let mut bucket = BucketState {
            last_leak: 50,
            level: 2.0,
        };

        assert!(bucket.leak_and_admit(40, 1.0, 10.0));
        assert_eq!(bucket.level, 3.0);
    }

    #[test]
    fn test_script_apply_roundtrips_state() {
        let mut state = ScriptState::new();

        assert!((LEAKY_BUCKET.apply)(&mut state, &[10.0, 1.0, 2.0]));
        assert!((LEAKY_BUCKET.apply)(&mut state, &[10.0, 1.0, 2.0]));
        assert!(!(LEAKY_BUCKET.apply)(&mut state, &[10.0, 1.0, 2.0]));

        assert_eq!(state[LEVEL], 2.0);
        assert_eq!(state[LAST_LEAK], 10.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "leaky_bucket expects now, drain_rate and capacity")]
    fn test_script_apply_rejects_missing_args() {
        let mut state = ScriptState::new();
        (LEAKY_BUCKET.apply)(&mut state, &[10.0, 1.0]);
    }

    proptest! {
        #[test]
        fn test_level_stays_within_capacity(
            steps in prop::collection::vec(0i64..5, 1..100),
            drain_rate in 0.01f64..5.0,
            capacity in 1u32..50,
        ) {
            let capacity = f64::from(capacity);
            let mut now = 0;
            let mut bucket = BucketState::fresh(now);

            for step in steps {
                now += step;
                let before = bucket.level;
                let admitted = bucket.leak_and_admit(now, drain_rate, capacity);

                prop_assert!(bucket.level >= 0.0);
                prop_assert!(bucket.level <= capacity);
                if admitted {
                    prop_assert!(bucket.level >= 1.0);
                } else {
                    prop_assert!(bucket.level <= before);
                }
            }
        }
    }
}
