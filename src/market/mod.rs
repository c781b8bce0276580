// Exchange session handling and candle sanity checks
pub mod session;
pub mod validator;

pub use session::{find_opening_candle, previous_session, ExchangeSession};
pub use validator::CandleValidator;
