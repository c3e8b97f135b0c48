//! # tegap-core: Topology and Demand Model
//!
//! Fundamental data structures for traffic-engineering gap analysis:
//! directed capacity graphs with link aggregation groups, demand domains,
//! path sets, and failure scenarios.
//!
//! ## Quick Start
//!
//! ```rust
//! use tegap_core::{Topology, Pair, DemandModel, FailureScenario};
//!
//! let mut topo = Topology::new();
//! for n in ["a", "b", "c", "d"] {
//!     topo.add_node(n).unwrap();
//! }
//! topo.add_edge("a", "b", 10.0).unwrap();
//! topo.add_edge("b", "d", 10.0).unwrap();
//!
//! let demand = DemandModel::fixed([(Pair::new("a", "d"), 5.0)]);
//! assert!(demand.validate().is_ok());
//!
//! let mut scenario = FailureScenario::none();
//! scenario.fail_edge("a", "b");
//! assert_eq!(scenario.available_capacity(topo.link("a", "b").unwrap()), 0.0);
//! ```

pub mod demand;
pub mod error;
pub mod path;
pub mod scenario;
pub mod topology;

pub use demand::{DemandError, DemandModel, DemandSpec, Pair};
pub use error::{approx_eq, approx_eq_eps, TegapError, TegapResult, EPSILON};
pub use path::{k_shortest_paths, Path, PathError, PathSet};
pub use scenario::{bounded_down_sets, ConfigError, FailureDomain, FailureScenario};
pub use topology::{Link, SubLink, Topology, TopologyError};
