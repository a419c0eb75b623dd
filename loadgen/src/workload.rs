use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of distinct keys the YCSB-style workloads draw from.
pub const KEY_SPACE: u64 = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    /// 50% reads / 50% writes.
    YcsbA,
    /// 95% reads / 5% writes.
    YcsbB,
    /// Read-only.
    YcsbC,
    /// Payment transfers between accounts instead of key sampling.
    Transfer,
}

impl WorkloadKind {
    pub fn read_fraction(self) -> f64 {
        match self {
            WorkloadKind::YcsbA => 0.5,
            WorkloadKind::YcsbB => 0.95,
            WorkloadKind::YcsbC => 1.0,
            WorkloadKind::Transfer => 0.0,
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YCSB-A" => Ok(WorkloadKind::YcsbA),
            "YCSB-B" => Ok(WorkloadKind::YcsbB),
            "YCSB-C" => Ok(WorkloadKind::YcsbC),
            "xfer" => Ok(WorkloadKind::Transfer),
            other => Err(format!("unknown workload {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WorkloadOp {
    pub key: u64,
    pub is_read: bool,
}

/// Draws keys and read/write decisions for one client.
pub struct Workload {
    kind: WorkloadKind,
    zipf: Zipfian,
    rng: StdRng,
}

impl Workload {
    pub fn new(kind: WorkloadKind, theta: f64) -> Workload {
        Workload {
            kind,
            zipf: Zipfian::new(KEY_SPACE, theta),
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    fn with_seed(kind: WorkloadKind, theta: f64, seed: u64) -> Workload {
        Workload {
            kind,
            zipf: Zipfian::new(KEY_SPACE, theta),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next(&mut self) -> WorkloadOp {
        let key = self.zipf.next(&mut self.rng);
        let is_read = self.rng.gen::<f64>() < self.kind.read_fraction();
        WorkloadOp { key, is_read }
    }
}

/// YCSB-style Zipfian generator over `[0, n)`: the zeta terms are computed
/// once up front, after which each draw is O(1). Smaller keys are hotter;
/// `theta` close to 1 concentrates almost all traffic on a few keys.
struct Zipfian {
    n: u64,
    theta: f64,
    alpha: f64,
    zeta_n: f64,
    eta: f64,
}

impl Zipfian {
    fn new(n: u64, theta: f64) -> Zipfian {
        let zeta_two_theta = zeta(2, theta);
        let zeta_n = zeta(n, theta);
        Zipfian {
            n,
            theta,
            alpha: 1.0 / (1.0 - theta),
            zeta_n,
            eta: (1.0 - (2.0 / n as f64).powf(1.0 - theta)) / (1.0 - zeta_two_theta / zeta_n),
        }
    }

    fn next(&self, rng: &mut impl Rng) -> u64 {
        let u: f64 = rng.gen();
        let uz = u * self.zeta_n;
        if uz < 1.0 {
            return 0;
        }
        if uz < 1.0 + 0.5f64.powf(self.theta) {
            return 1;
        }
        let key = (self.n as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as u64;
        key.min(self.n - 1)
    }
}

fn zeta(n: u64, theta: f64) -> f64 {
    (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum()
}
