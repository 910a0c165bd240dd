//! Scope and discovery-mode handlers of the device service.
//!
//! Every successful scope mutation is persisted by the [`ScopeStore`] and
//! followed by a fresh Hello.
//!
//! [`ScopeStore`]: crate::discovery::ScopeStore

use crate::service::{Context, HandlerResult, ServerEvent, respond};
use crate::soap::fault::reason;
use crate::soap::model::ElementId;
use crate::soap::names::{DEVICE, SCHEMA};
use crate::soap::{Fault, FaultCode, FaultSubcode, Message};

const DISCOVERABLE: &str = "Discoverable";
const NON_DISCOVERABLE: &str = "NonDiscoverable";

pub fn get_scopes(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let all = ctx.scopes.all();
    if all.is_empty() {
        return Err(Fault::nested(
            FaultCode::Receiver,
            FaultSubcode::Action,
            FaultSubcode::EmptyScope,
            reason::SCOPE_EMPTY,
        )
        .into());
    }

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetScopesResponse")?;
    for (kind, scope) in all {
        let node = msg.add_child(resp, DEVICE.prefix, "Scopes")?;
        msg.add_leaf(node, SCHEMA.prefix, "ScopeDef", kind.as_str())?;
        msg.add_leaf(node, SCHEMA.prefix, "ScopeItem", scope)?;
    }
    Ok(msg)
}

pub fn set_scopes(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    ctx.scopes.set(scope_values(req, method))?;
    ctx.notify(ServerEvent::ScopesChanged);
    let (msg, _) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "SetScopesResponse")?;
    Ok(msg)
}

pub fn add_scopes(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    ctx.scopes.add(scope_values(req, method))?;
    ctx.notify(ServerEvent::ScopesChanged);
    let (msg, _) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "AddScopesResponse")?;
    Ok(msg)
}

/// The response echoes the removed items.
pub fn remove_scopes(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    let items = scope_values(req, method);
    ctx.scopes.remove(&items)?;
    ctx.notify(ServerEvent::ScopesChanged);

    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "RemoveScopesResponse")?;
    for item in items {
        msg.add_leaf(resp, DEVICE.prefix, "ScopeItem", item)?;
    }
    Ok(msg)
}

pub fn get_discovery_mode(ctx: &Context, _req: &Message, _method: ElementId) -> HandlerResult {
    let mode = if ctx.discovery.is_discoverable() {
        DISCOVERABLE
    } else {
        NON_DISCOVERABLE
    };
    let (mut msg, resp) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "GetDiscoveryModeResponse")?;
    msg.add_leaf(resp, DEVICE.prefix, "DiscoveryMode", mode)?;
    Ok(msg)
}

pub fn set_discovery_mode(ctx: &Context, req: &Message, method: ElementId) -> HandlerResult {
    match req.child_value(method, "DiscoveryMode") {
        Some(DISCOVERABLE) => ctx.discovery.set_discoverable(true),
        Some(NON_DISCOVERABLE) => ctx.discovery.set_discoverable(false),
        other => {
            tracing::warn!(mode = ?other, "unknown discovery mode");
            return Err(Fault::new(
                FaultCode::Sender,
                FaultSubcode::InvalidArgVal,
                reason::CONFIG_PARAM_NOT_SET,
            )
            .into());
        }
    }
    let (msg, _) = respond(&[DEVICE, SCHEMA], DEVICE.prefix, "SetDiscoveryModeResponse")?;
    Ok(msg)
}

/// Values of every `Scopes` (Set/Add) or `ScopeItem` (Remove) child.
fn scope_values(req: &Message, method: ElementId) -> Vec<String> {
    req.children(method)
        .iter()
        .filter_map(|&c| req.value(c))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::service::testing::{fault, fixture, method, request, text};

    #[test]
    fn get_lists_fixed_then_dynamic() {
        let f = fixture();
        f.ctx.scopes.set(vec!["custom/x".into()]).unwrap();
        let req = request("<tds:GetScopes/>");
        let out = text(&get_scopes(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains(
            "<tds:Scopes><tt:ScopeDef>Fixed</tt:ScopeDef><tt:ScopeItem>onvif://www.onvif.org/manufacturer/onvif-rs</tt:ScopeItem></tds:Scopes>"
        ));
        assert!(out.contains(
            "<tds:Scopes><tt:ScopeDef>Configurable</tt:ScopeDef><tt:ScopeItem>custom/x</tt:ScopeItem></tds:Scopes>"
        ));
    }

    #[test]
    fn set_add_remove_notify_and_persist() {
        let f = fixture();
        let (tx, rx) = mpsc::channel();
        f.ctx.subscribe(tx);

        let req = request("<tds:SetScopes><tds:Scopes>a</tds:Scopes><tds:Scopes>b</tds:Scopes></tds:SetScopes>");
        set_scopes(&f.ctx, &req, method(&req)).unwrap();
        assert_eq!(rx.try_recv(), Ok(ServerEvent::ScopesChanged));

        let req = request("<tds:AddScopes><tds:ScopeItem>c</tds:ScopeItem></tds:AddScopes>");
        add_scopes(&f.ctx, &req, method(&req)).unwrap();
        assert_eq!(f.ctx.scopes.dynamic(), vec!["a", "b", "c"]);

        let req = request("<tds:RemoveScopes><tds:ScopeItem>b</tds:ScopeItem></tds:RemoveScopes>");
        let out = text(&remove_scopes(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains("<tds:RemoveScopesResponse><tds:ScopeItem>b</tds:ScopeItem></tds:RemoveScopesResponse>"));
        assert_eq!(
            std::fs::read_to_string(f.dir.path().join("scopes")).unwrap(),
            "a|c|"
        );
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn scope_faults() {
        let f = fixture();
        let many: String = (0..11).map(|i| format!("<tds:Scopes>s{i}</tds:Scopes>")).collect();
        let req = request(&format!("<tds:SetScopes>{many}</tds:SetScopes>"));
        let err = fault(set_scopes(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::TooManyScopes));
        assert_eq!(err.code, FaultCode::Receiver);

        let req = request(
            "<tds:RemoveScopes><tds:ScopeItem>onvif://www.onvif.org/name/onvif-device</tds:ScopeItem></tds:RemoveScopes>",
        );
        let err = fault(remove_scopes(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.subcode, FaultSubcode::OperationProhibited);
        assert_eq!(err.detail, Some(FaultSubcode::FixedScope));

        let req = request("<tds:RemoveScopes><tds:ScopeItem>nope</tds:ScopeItem></tds:RemoveScopes>");
        let err = fault(remove_scopes(&f.ctx, &req, method(&req)).unwrap_err());
        assert_eq!(err.detail, Some(FaultSubcode::NoScope));
    }

    #[test]
    fn discovery_mode_toggles() {
        let f = fixture();
        let req = request("<tds:SetDiscoveryMode><tds:DiscoveryMode>NonDiscoverable</tds:DiscoveryMode></tds:SetDiscoveryMode>");
        set_discovery_mode(&f.ctx, &req, method(&req)).unwrap();
        assert!(!f.ctx.discovery.is_discoverable());

        let req = request("<tds:GetDiscoveryMode/>");
        let out = text(&get_discovery_mode(&f.ctx, &req, method(&req)).unwrap());
        assert!(out.contains("<tds:DiscoveryMode>NonDiscoverable</tds:DiscoveryMode>"));

        let req = request("<tds:SetDiscoveryMode><tds:DiscoveryMode>Sometimes</tds:DiscoveryMode></tds:SetDiscoveryMode>");
        assert!(set_discovery_mode(&f.ctx, &req, method(&req)).is_err());
    }
}
