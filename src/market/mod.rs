pub mod dexscreener;
pub mod history;
pub mod price;

pub use history::Ring;
pub use price::PriceService;
