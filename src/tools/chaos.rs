//! 失败注入：模拟不可靠的上游
//!
//! 所有模拟工具共享一个随机源（可固定种子复现）；每个工具声明自己的瞬时失败率与业务失败率。

use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// 单个工具的失败概率
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureProfile {
    pub transient: f64,
    pub domain: f64,
}

impl FailureProfile {
    pub const fn new(transient: f64, domain: f64) -> Self {
        Self { transient, domain }
    }
}

/// 掷骰结果：先判瞬时失败，再判业务失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Roll {
    Transient,
    Domain,
    Success,
}

/// 共享随机源
#[derive(Debug)]
pub struct Chaos {
    rng: Mutex<StdRng>,
}

impl Chaos {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }

    pub fn roll(&self, profile: FailureProfile) -> Roll {
        self.with_rng(|rng| {
            if rng.gen_bool(profile.transient) {
                Roll::Transient
            } else if rng.gen_bool(profile.domain) {
                Roll::Domain
            } else {
                Roll::Success
            }
        })
    }

    pub fn chance(&self, p: f64) -> bool {
        self.with_rng(|rng| rng.gen_bool(p))
    }

    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        self.with_rng(|rng| items.choose(rng))
    }

    pub fn range(&self, range: RangeInclusive<u64>) -> u64 {
        if range.start() >= range.end() {
            return *range.start();
        }
        self.with_rng(|rng| rng.gen_range(range))
    }

    /// n 位十进制数字
    pub fn digits(&self, n: usize) -> String {
        self.with_rng(|rng| (0..n).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect())
    }

    /// n 位大写字母数字
    pub fn alnum(&self, n: usize) -> String {
        const CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
        self.with_rng(|rng| {
            (0..n)
                .map(|_| char::from(CHARS[rng.gen_range(0..CHARS.len())]))
                .collect()
        })
    }

    pub fn delay(&self, range: RangeInclusive<u64>) -> Duration {
        Duration::from_millis(self.range(range))
    }
}

impl Default for Chaos {
    fn default() -> Self {
        Self::new(None)
    }
}
