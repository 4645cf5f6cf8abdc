/// Middleware for bearer-token authentication on protected routes.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
