//! PTZ service. The device has no PTZ nodes; both queries answer with
//! empty lists.

use crate::service::{Context, HandlerResult, respond};
use crate::soap::Message;
use crate::soap::model::ElementId;
use crate::soap::names::{PTZ, SCHEMA};

pub fn get_nodes(_ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (msg, _) = respond(&[PTZ, SCHEMA], PTZ.prefix, "GetNodesResponse")?;
    Ok(msg)
}

pub fn get_configurations(_ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let (msg, _) = respond(&[PTZ, SCHEMA], PTZ.prefix, "GetConfigurationsResponse")?;
    Ok(msg)
}
