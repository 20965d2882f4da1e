/*
    core_engine - Request parsing and domain operations

    Subsystems:
    - command: request frames, op codes, argument parsing
    - engine: authenticated social/wallet operations over the store
    - conversion: external exchange-rate lookup
    - render: text payloads sent back to clients
*/

pub mod command;
pub mod conversion;
pub mod engine;
pub mod errors;
pub mod render;

pub use command::{Command, ControlCommand, Request, UNKNOWN_OPERATION};
pub use conversion::{ConversionError, CurrencyConverter, FixedRate, HttpRateConverter};
pub use engine::{Engine, FollowOutcome, LoginGrant, UnfollowOutcome};
pub use errors::{EngineError, EngineResult};
