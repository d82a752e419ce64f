use axum::response::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Wine Line API",
        version = "0.1.0",
        description = r#"
# Wine Line API

Ingests sensor readings from the wine production line, scores each product with the
quality prediction service and raises alerts when a warehouse's thresholds are crossed.

## Authentication

Alert and live endpoints require a bearer token signed with the service secret:

```
Authorization: Bearer <your-jwt-token>
```

Browsers opening the WebSocket feed pass the same token as `?access_token=`.
The simulation endpoints are open to the line simulator.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:5001", description = "Local development")
    ),
    tags(
        (name = "simulation", description = "Reading ingestion and recent readings"),
        (name = "alerts", description = "Alert inbox and threshold settings"),
        (name = "live", description = "Per-warehouse live feed"),
        (name = "health", description = "Liveness and build information")
    ),
    modifiers(&SecurityAddon),
    paths(
        crate::handlers::simulation::ingest_reading,
        crate::handlers::simulation::recent_readings,

        crate::handlers::alerts::list_alerts,
        crate::handlers::alerts::announce_alert,
        crate::handlers::alerts::mark_read,
        crate::handlers::alerts::delete_read,
        crate::handlers::alerts::alert_details,
        crate::handlers::alerts::delete_alert,
        crate::handlers::alerts::get_settings,
        crate::handlers::alerts::update_settings,
        crate::handlers::alerts::delete_setting,

        crate::handlers::live::warehouse_feed,

        crate::handlers::health::health_check,
        crate::handlers::health::api_status,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::services::alerts::SettingInput,
            crate::handlers::alerts::AnnounceRequest,
            crate::handlers::alerts::MarkReadRequest,
            crate::handlers::alerts::UpdateSettingsRequest,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("Wine Line API"));
        assert!(json.contains("/simulation/data"));
        assert!(json.contains("/alerts/settings/{metric}"));
        assert!(json.contains("/ws/warehouses/{warehouse_id}"));
        assert!(json.contains("bearer_auth"));
    }
}
