pub mod interaction;
pub mod ltm;
pub mod profile;
pub mod session;
pub mod turn;

pub use interaction::{AgentInteraction, InteractionKind};
pub use ltm::LtmEntry;
pub use profile::StoredProfile;
pub use session::{Session, SessionMode};
pub use turn::{Turn, TurnRole};
