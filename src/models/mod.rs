mod click;
mod link;
mod statistics;

pub use click::ClickEvent;
pub use link::ShortLink;
pub use statistics::Statistics;
