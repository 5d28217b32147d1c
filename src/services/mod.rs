pub mod calendar;
pub mod strava;
pub mod weather;

pub use calendar::{busy_blocks, CalendarClient};
pub use strava::{import_completions, StravaClient};
pub use weather::{load_forecast, outdoor_warning, Forecast, WeatherWarning};
