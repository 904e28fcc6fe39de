//! Head-rank console report: wall-clock performance and the pooled
//! travel-time statistics.

use sim_pipeline_core::stats::GlobalStats;

pub fn print_banner(fingerprint: &str) {
    println!("==============================================");
    println!("||   CELLULAR AUTOMATA TRAFFIC SIMULATION   ||");
    println!("==============================================");
    println!("run fingerprint: {fingerprint}");
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub fingerprint: String,
    pub elapsed_secs: f64,
    pub ticks: u64,
    pub combined: Option<GlobalStats>,
}

impl RunReport {
    pub fn iterations_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.ticks as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn print(&self) {
        println!("--- simulation performance ---");
        println!("total computation time: {:.6} [s]", self.elapsed_secs);
        println!(
            "average iterating frequency: {:.1} [iter/s]",
            self.iterations_per_sec()
        );
        println!("--- combined statistics across all workers ---");
        match &self.combined {
            Some(stats) => println!(
                "time on segment: avg={:.3}, std={:.3}, N={}",
                stats.mean,
                stats.std_dev(),
                stats.count
            ),
            None => println!("time on segment: no samples past the warm-up period"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_rate_divides_ticks_by_elapsed_time() {
        let report = RunReport {
            fingerprint: "abc123def456".into(),
            elapsed_secs: 2.0,
            ticks: 500,
            combined: None,
        };
        assert_eq!(report.iterations_per_sec(), 250.0);
    }

    #[test]
    fn zero_elapsed_time_does_not_divide_by_zero() {
        let report = RunReport {
            fingerprint: "abc123def456".into(),
            elapsed_secs: 0.0,
            ticks: 500,
            combined: None,
        };
        assert_eq!(report.iterations_per_sec(), 0.0);
    }
}
