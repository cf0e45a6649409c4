//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, borrows, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Borrowdesk API",
        version = "1.0.0",
        description = "Library borrow request REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        // Books
        books::list_books,
        books::create_book,
        // Borrow requests
        borrows::create_borrow_request,
        borrows::list_borrow_requests,
        borrows::update_borrow_status,
        borrows::download_history,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            crate::models::user::RegisterUser,
            crate::models::user::UserInfo,
            crate::models::user::Role,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            // Borrow requests
            crate::models::borrow::BorrowRequest,
            crate::models::borrow::BorrowStatus,
            crate::models::borrow::CreateBorrowRequest,
            crate::models::borrow::UpdateBorrowStatus,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and authentication"),
        (name = "books", description = "Book catalog"),
        (name = "borrows", description = "Borrow requests and history")
    )
)]
pub struct ApiDoc;

/// Declares the `bearer_auth` scheme referenced by the secured paths
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

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
