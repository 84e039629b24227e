use super::{Action, ActionRequest, ActionResponse, RequestContext};
use crate::errors::AppError;
use serde_json::json;

/// 首页
pub struct HomeIndexAction;

impl Action for HomeIndexAction {
    fn name(&self) -> &'static str {
        "home.index"
    }

    fn handle(&self, ctx: &RequestContext, request: &ActionRequest) -> Result<ActionResponse, AppError> {
        let user = ctx.auth().current_user()?;
        let view_data = ctx.view_data(json!({
            "now": chrono::Local::now().format("%d.%m.%Y %H:%M:%S").to_string(),
            "url": ctx.router().path_for("root"),
            "user": user.map(|u| u.full_name()),
            "path": request.path,
        }));

        let mut html = ctx.render("home/index.html", &view_data)?;
        if ctx.csrf().protects_forms() {
            html = ctx.csrf().inject_form_field(&html)?;
        }
        Ok(ActionResponse::html(html))
    }
}

/// 把解析后的请求体原样作为 JSON 返回
pub struct HomePingAction;

impl Action for HomePingAction {
    fn name(&self) -> &'static str {
        "home.ping"
    }

    fn handle(&self, _ctx: &RequestContext, request: &ActionRequest) -> Result<ActionResponse, AppError> {
        Ok(ActionResponse::json(request.body.clone()))
    }
}
