#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate quill;

    use actix_web::{web, App as ActixApp, HttpRequest, HttpResponse, HttpServer};
    use quill::config::Config;
    use quill::App;

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request, Response};

        pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                _ => Method::Get,
            };

            let uri = req.uri().to_string();

            let mut builder = Request::builder();
            builder.method(method).uri(&uri);
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    builder.header(name.as_str(), val_str);
                }
            }

            builder.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();

            let mut response = actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );
            for (name, value) in spin_resp.headers() {
                if let Some(value) = value.as_str() {
                    response.insert_header((name.to_string(), value.to_string()));
                }
            }

            response.body(spin_resp.body().to_vec())
        }
    }

    fn init_tracing() {
        use tracing_subscriber::EnvFilter;

        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .init();
    }

    pub async fn run() -> anyhow::Result<()> {
        init_tracing();

        let config = Config::from_env();
        let bind = config.bind.clone();
        let app = App::in_memory(config);
        if app.config.seed {
            app.store.seed_demo_data()?;
        }
        let app = web::Data::new(app);

        tracing::info!(%bind, "server listening");

        HttpServer::new(move || {
            ActixApp::new()
                .app_data(app.clone())
                .app_data(web::PayloadConfig::new(8 * 1024 * 1024))
                .default_service(web::route().to(handle_all))
        })
        .bind(bind)?
        .run()
        .await?;

        Ok(())
    }

    async fn handle_all(app: web::Data<App>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
        let spin_req = adapter::actix_to_spin_request(&req, body);
        adapter::spin_to_actix_response(app.handle(&spin_req))
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
