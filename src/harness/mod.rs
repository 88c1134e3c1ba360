//! Hierarchical test harness
//!
//! Tests are async functions taking an [`H`]. A test may start subtests with
//! [`H::run`]; subtests run one after another unless they call
//! [`H::parallel`], in which case they are deferred until the body of their
//! parent returns and then run together, bounded by the suite's parallelism
//! budget.
//!
//! ```no_run
//! use kola_harness::config::Options;
//! use kola_harness::harness::{Suite, Test};
//!
//! # async fn demo() -> kola_harness::error::Result<()> {
//! let tests = vec![Test::new("network", |h| async move {
//!     // Shared setup runs before any parallel subtest starts.
//!     for name in ["dns", "ntp", "http"] {
//!         h.run(name, |h| async move {
//!             h.parallel().await;
//!             h.log("checking");
//!         })
//!         .await;
//!     }
//! })];
//!
//! let outcome = Suite::new(Options::default(), tests)?.run().await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```
//!
//! Subtest names are unique within a run: whitespace becomes `_` and a
//! repeated name gets a `#NN` suffix. The run pattern is split on `/` and
//! each element is matched against the same level of the name.

mod handle;
mod matcher;
mod node;
mod runner;
mod scheduler;
mod suite;

pub use handle::H;
pub use matcher::Matcher;
pub use node::Phase;
pub use scheduler::Scheduler;
pub use suite::{clean_output_dir, Suite, SuiteOutcome, Test, TestFn};
