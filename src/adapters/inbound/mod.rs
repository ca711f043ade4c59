mod api_server;

pub use api_server::{api_router, AlertsQuery, ApiServer, ApiState, HealthResponse};
