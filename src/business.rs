//! Versioned business endpoints.
//!
//! Placeholders until the backing services are wired in; each answers
//! `200 {"message": "<name> endpoint"}`.

use serde::Serialize;

use crate::error::ConfigError;
use crate::method::Method;
use crate::request::Request;
use crate::response::Json;
use crate::router::RouteGroup;

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

/// Registers every business route under `group` (normally `/api/v1`).
pub fn mount(group: &mut RouteGroup<'_>) -> Result<(), ConfigError> {
    group
        .on(Method::Get,  "/business/analytics",                business_analytics)?
        .on(Method::Get,  "/business/crm",                      crm)?
        .on(Method::Post, "/entrepreneur/validate-idea",        validate_idea)?
        .on(Method::Post, "/entrepreneur/financial-simulation", financial_simulation)?
        .on(Method::Get,  "/pyme/team-management",              team_management)?
        .on(Method::Get,  "/pyme/strategic-planning",           strategic_planning)?;
    Ok(())
}

pub async fn business_analytics(_req: Request) -> Json<Message> {
    Json(Message { message: "Business Analytics endpoint" })
}

pub async fn crm(_req: Request) -> Json<Message> {
    Json(Message { message: "CRM endpoint" })
}

pub async fn validate_idea(_req: Request) -> Json<Message> {
    Json(Message { message: "Idea Validation endpoint" })
}

pub async fn financial_simulation(_req: Request) -> Json<Message> {
    Json(Message { message: "Financial Simulation endpoint" })
}

pub async fn team_management(_req: Request) -> Json<Message> {
    Json(Message { message: "Team Management endpoint" })
}

pub async fn strategic_planning(_req: Request) -> Json<Message> {
    Json(Message { message: "Strategic Planning endpoint" })
}
