pub mod engine_consts {
    //! Dashboard Engine Configuration Constants
    //!
    //! This module contains all configuration constants for the dashboard
    //! engine, organized by functional area for clarity and maintainability.

    // =============================================================================
    // GRID CONFIGURATION
    // =============================================================================

    /// Number of grid columns a dashboard is divided into.
    pub const GRID_COL_COUNT: u32 = 100;

    /// Pixel padding subtracted from the computed row height.
    pub const ROW_HEIGHT_PADDING: f64 = 10.0;

    /// Computes the grid row height for a given viewport width in pixels.
    pub fn row_height(viewport_width: f64) -> f64 {
        viewport_width / GRID_COL_COUNT as f64 - ROW_HEIGHT_PADDING
    }

    // =============================================================================
    // QUEUE CONFIGURATION
    // =============================================================================

    /// Maximum number of buffered engine events.
    pub const EVENT_QUEUE_SIZE: usize = 100;

    // =============================================================================
    // NETWORK CONFIGURATION
    // =============================================================================

    /// Dashboard API request configuration
    pub mod dashboard_api {
        use std::time::Duration;

        /// Connection timeout for dashboard API requests (milliseconds)
        pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

        /// Overall timeout for dashboard API requests (milliseconds)
        pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

        /// Helper function to get the connection timeout
        pub const fn connect_timeout() -> Duration {
            Duration::from_millis(CONNECT_TIMEOUT_MS)
        }

        /// Helper function to get the request timeout
        pub const fn request_timeout() -> Duration {
            Duration::from_millis(REQUEST_TIMEOUT_MS)
        }
    }

    /// Remote module script loading configuration
    pub mod script_loading {
        use std::time::Duration;

        /// Overall timeout for fetching a remote module bundle (milliseconds)
        pub const FETCH_TIMEOUT_MS: u64 = 30_000;

        /// Helper function to get the fetch timeout
        pub const fn fetch_timeout() -> Duration {
            Duration::from_millis(FETCH_TIMEOUT_MS)
        }
    }
}
