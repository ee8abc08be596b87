use std::convert::Infallible;

use hyper::{
    Body, Request, Response, Server,
    service::{make_service_fn, service_fn},
};
use owo_colors::OwoColorize;
use prometheus::{Encoder, Registry, TextEncoder};

/// Registries collected from each running controller, exposed together on a
/// single `/metrics` endpoint.
#[derive(Clone, Default)]
pub struct Registries(Vec<Registry>);

impl Registries {
    pub fn push(&mut self, registry: Registry) {
        self.0.push(registry);
    }

    fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.0.iter().flat_map(|r| r.gather()).collect()
    }
}

async fn serve(registries: Registries, _req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let metric_families = registries.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    Ok(Response::new(Body::from(buffer)))
}

/// Runs the Prometheus scrape endpoint on `0.0.0.0:<port>` until the process
/// exits. Never returns under normal operation.
pub async fn run_server(port: u16, registries: Registries) {
    let addr = ([0, 0, 0, 0], port).into();
    let make_svc = make_service_fn(move |_conn| {
        let registries = registries.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| serve(registries.clone(), req)))
        }
    });
    println!(
        "{}{}",
        "📈 Starting metrics server • port=".green(),
        port.to_string().green().dimmed(),
    );
    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        eprintln!("{}", format!("metrics server error: {e}").red());
    }
}
