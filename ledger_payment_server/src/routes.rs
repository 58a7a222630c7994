//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every handler is async. Anything that touches the scheduler is a quick in-memory read, so nothing here blocks a
//! worker thread.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use lpg_common::Secret;

use crate::{errors::ServerError, monitor::MonitorControl};

/// The header carrying the operator token.
pub const ADMIN_TOKEN_HEADER: &str = "lpg_admin_token";

/// The configured operator token, shared with handlers through `app_data`.
#[derive(Clone, Debug, Default)]
pub struct AdminToken(pub Secret<String>);

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Monitor  ----------------------------------------------------
route!(monitor_status => Get "/monitor/status" impl MonitorControl);
/// Route handler for the monitor status endpoint
///
/// Reports whether reconciliation is running, the failure tracker's state, worker pool counters and a summary of the
/// last cycle. A `paused` status means the ledger has failed too many times in a row and only a trial query runs each
/// cycle until it recovers.
pub async fn monitor_status<M: MonitorControl>(
    req: HttpRequest,
    token: web::Data<AdminToken>,
    monitor: web::Data<M>,
) -> Result<HttpResponse, ServerError> {
    check_admin_token(&req, &token)?;
    debug!("💻️ GET monitor status");
    Ok(HttpResponse::Ok().json(monitor.status()))
}

route!(monitor_resume => Post "/monitor/resume" impl MonitorControl);
/// Route handler for the manual resume endpoint
///
/// Clears a paused failure tracker so that the next cycle reconciles normally instead of probing.
pub async fn monitor_resume<M: MonitorControl>(
    req: HttpRequest,
    token: web::Data<AdminToken>,
    monitor: web::Data<M>,
) -> Result<HttpResponse, ServerError> {
    check_admin_token(&req, &token)?;
    info!("💻️ Manual resume of reconciliation requested");
    Ok(HttpResponse::Ok().json(monitor.resume()))
}

fn check_admin_token(req: &HttpRequest, token: &AdminToken) -> Result<(), ServerError> {
    if token.0.is_empty() {
        return Err(ServerError::AdminDisabled);
    }
    let candidate = req.headers().get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if token.0.matches(candidate) {
        Ok(())
    } else {
        warn!("💻️ Rejected an operator request with a missing or invalid admin token");
        Err(ServerError::Unauthorized)
    }
}
