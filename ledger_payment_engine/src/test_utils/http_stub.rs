//! A local HTTP endpoint for exercising the real HTTP clients. It records the query string of every request it
//! receives and answers each one with the same canned reply.
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use actix_web::{dev::ServerHandle, http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};

struct StubState {
    status: StatusCode,
    body: String,
    requests: Mutex<Vec<HashMap<String, String>>>,
}

pub struct HttpStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: ServerHandle,
}

impl HttpStub {
    /// Starts the stub on an ephemeral port. Must be called from within an actix runtime.
    pub async fn start(status: u16, body: &str) -> Self {
        let state = Arc::new(StubState {
            status: StatusCode::from_u16(status).expect("Invalid status code"),
            body: body.to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let data = web::Data::from(Arc::clone(&state));
        let server = HttpServer::new(move || App::new().app_data(data.clone()).default_service(web::to(record)))
            .workers(1)
            .disable_signals()
            .bind(("127.0.0.1", 0))
            .expect("Could not bind stub server");
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        Self { addr, state, handle }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{path_and_query}", self.addr)
    }

    /// The query parameters of every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.state.requests.lock().unwrap().clone()
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

async fn record(req: HttpRequest, state: web::Data<StubState>) -> HttpResponse {
    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(|q| q.into_inner())
        .unwrap_or_default();
    state.requests.lock().unwrap().push(query);
    HttpResponse::build(state.status).body(state.body.clone())
}
