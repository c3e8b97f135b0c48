//! # tegap-algo: Flow Encoders and Adversarial Gap Search
//!
//! Linear encodings of traffic-engineering schemes over a shared
//! topology, plus the machinery to find the demand and failure inputs
//! on which a heuristic scheme falls furthest behind the optimum.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use tegap_core::{FailureScenario, Pair, Topology};
//! use tegap_algo::{AdversarialGenerator, DemandPinningEncoder, OptimalFlowEncoder};
//!
//! let mut topo = Topology::new();
//! for n in ["a", "b", "c", "d"] {
//!     topo.add_node(n).unwrap();
//! }
//! topo.add_edge("a", "b", 10.0).unwrap();
//! topo.add_edge("a", "c", 10.0).unwrap();
//! topo.add_edge("b", "d", 10.0).unwrap();
//! topo.add_edge("c", "d", 10.0).unwrap();
//!
//! let mut gen = AdversarialGenerator::new(
//!     topo,
//!     OptimalFlowEncoder::new(),
//!     DemandPinningEncoder::new(5.0),
//! );
//! let demands = BTreeMap::from([(Pair::new("a", "d"), 4.0)]);
//! // below the pinning threshold the two schemes agree
//! let gap = gen.get_gap(&demands, &FailureScenario::none()).unwrap();
//! assert!(gap.abs() < 1e-6);
//! ```

pub mod adversary;
pub mod backend;
pub mod bilevel;
pub mod encoder;
pub mod sampler;
pub mod session;

pub use adversary::{
    AdversarialGenerator, AdversaryConfig, AdversaryError, GapResult, InnerMethod,
};
pub use backend::{default_backend, GoodLpBackend, SolveBackend};
pub use bilevel::{apply_optimality_conditions, BilevelError};
pub use encoder::{
    BackupPathEncoder, DemandPinningEncoder, EncodeError, EncoderContext, Encoding, FlowEncoder,
    OptimalFlowEncoder, OuterVars, PopEncoder, ResilientFlowEncoder, Solution,
};
pub use sampler::{random_capacities, sample_scenario};
pub use session::{
    Cmp, Direction, LinExpr, Session, SolveError, SolverOutcome, VarId, VarKind,
};
