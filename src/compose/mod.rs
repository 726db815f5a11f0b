mod bag;
mod dependencies;
mod facade;
mod projection;
mod proxy;


pub use bag::Bag;
pub use dependencies::{with_dependencies, Dependencies};
pub use facade::Facade;
pub use projection::{FromSlots, Slots};
pub use proxy::Proxy;
