pub mod debug_session;

// Re-export types
pub use debug_session::{
    Condition, ConditionStatus, DebugCapabilities, DebugSecurity, DebugSession, DebugSessionSpec,
    DebugSessionStatus, SessionPhase,
};
