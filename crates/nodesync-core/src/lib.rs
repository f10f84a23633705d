// # nodesync-core
//
// Core library for keeping a DNS record in step with the ready members of a
// cluster.
//
// ## Architecture Overview
//
// - **MemberSource**: Trait for listing members and watching membership changes
// - **DnsProvider**: Trait for reading zones/records and upserting address records
// - **AddressResolver**: Trait for independent external name resolution
// - **address**: Ready members → sorted, deduplicated target address set
// - **ChangeGate**: Target set vs. last synced (or observed) set
// - **RecordSync**: Zone discovery and per-name upserts
// - **ConvergenceVerifier**: Polls resolution until the change is visible
// - **SyncEngine**: Serialized, coalescing reconcile loop owning SyncState
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Event-Driven**: Uses async streams for membership changes
// 3. **Full Recompute**: Every pass rebuilds the target set from inventory
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Unchanged inventory never reaches the provider twice

pub mod traits;
pub mod address;
pub mod gate;
pub mod sync;
pub mod verify;
pub mod engine;
pub mod model;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use traits::{AddressResolver, Clock, DnsProvider, MemberSource, MembershipStream, TokioClock};
pub use engine::{EngineEvent, PassOutcome, SyncEngine};
pub use gate::{Baseline, ChangeGate, GateDecision};
pub use sync::{RecordSync, SyncReport};
pub use verify::{Convergence, ConvergenceVerifier};
pub use model::{
    AddressType, Member, MembershipChange, RecordLookup, RecordName, RecordSet, RecordType,
    TargetAddressSet, Zone,
};
pub use config::{AddressMode, AddressPolicy, EngineConfig, SyncConfig};
pub use error::{Error, Result};
pub use state::SyncState;
