pub mod acknowledgements;
pub mod downtimes;
pub mod events;
pub mod health;
pub mod hosts;
pub mod services;
pub mod summary;
