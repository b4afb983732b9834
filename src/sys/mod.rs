// Contracts live in traits.rs; each sibling owns one system concern.

pub mod traits;     // Global contracts
pub mod secrets;    // Memory hygiene (CredentialRecord)
pub mod postgres;   // Credential store
pub mod render;     // auth_file rendering
pub mod artifact;   // Change detection, backup, atomic publish
pub mod reload;     // Reload marker + command
pub mod lock;       // Run serialisation
