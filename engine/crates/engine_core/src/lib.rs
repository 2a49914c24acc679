pub mod events;
pub mod signal;
pub mod tick;

pub use events::{
    player_subject, room_subject, zone_subject, Handler, LocalBus, PubSub, PubSubError,
    Subscription, WORLD_SUBJECT,
};
pub use signal::{signal_channel, Listener, Trigger};
pub use tick::{TickConfig, TickError, TickHandler, TickScheduler};
