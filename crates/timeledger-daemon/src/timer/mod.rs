pub mod guard;
pub mod scheduler;

pub use guard::RapidFiringDetector;
pub use scheduler::TimingScheduler;

/// Something the scheduler advances once per accepted tick.
///
/// Ticks run on a blocking worker; implementations handle their own errors.
pub trait TickTarget: Send + Sync + 'static {
    fn tick(&self);
}
