pub mod clock; // skipcq: RS-D1001

pub mod config; // skipcq: RS-D1001

pub mod cron; // skipcq: RS-D1001

pub mod dispatch; // skipcq: RS-D1001

pub mod errors; // skipcq: RS-D1001

pub mod queue; // skipcq: RS-D1001

pub mod runner; // skipcq: RS-D1001

pub mod schedule; // skipcq: RS-D1001

pub mod scheduler; // skipcq: RS-D1001

pub mod store; // skipcq: RS-D1001

pub mod task; // skipcq: RS-D1001

pub mod utils; // skipcq: RS-D1001
