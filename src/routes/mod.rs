/// Router Module Index
///
/// Routes are grouped by access level so the authorization gate is applied to a
/// whole module at once rather than per handler.

/// Routes open to anonymous clients: reads, signup and login.
pub mod public;

/// Routes behind the bearer-token gate.
pub mod authenticated;
