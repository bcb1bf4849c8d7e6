use crate::configuration::Settings;
use crate::connectors::TeamService;
use crate::db::ConversationStore;
use crate::helpers::JsonResponse;
use crate::hub::{Bridge, Hub, RedisBridge};
use crate::middleware;
use crate::routes;
use crate::services::live_chat::LiveChatService;
use actix_cors::Cors;
use actix_web::{dev::Server, error, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

pub async fn run(
    listener: TcpListener,
    settings: Settings,
    store: Arc<dyn ConversationStore>,
    team: Arc<dyn TeamService>,
) -> Result<Server, std::io::Error> {
    let bridge = if settings.bridge.enabled {
        let bridge = RedisBridge::new(&settings.bridge)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        tracing::info!(prefix = %settings.bridge.channel_prefix, "Cross-instance bridge enabled");
        Some(Arc::new(bridge))
    } else {
        None
    };

    let hub = Arc::new(Hub::new(
        store.clone(),
        settings.hub.clone(),
        bridge.clone().map(|bridge| bridge as Arc<dyn Bridge>),
    ));
    if let Some(bridge) = &bridge {
        bridge.spawn_listener(&hub);
    }

    let live_chat = web::Data::new(LiveChatService::new(
        store,
        team,
        hub.clone(),
        settings.live_chat.clone(),
    ));
    let hub = web::Data::new(hub);
    let settings = web::Data::new(settings);

    let oauth_http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    let oauth_http_client = web::Data::new(oauth_http_client);

    let oauth_cache = web::Data::new(middleware::authentication::OAuthCache::new(
        Duration::from_secs(60),
    ));

    let json_config = web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            let msg = match &err {
                error::JsonPayloadError::Deserialize(err) => {
                    format!("invalid body at line {}, column {}: {}", err.line(), err.column(), err)
                }
                other => other.to_string(),
            };
            JsonResponse::<()>::build().form_error(msg)
        });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::authentication::Manager::new())
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
            .app_data(oauth_http_client.clone())
            .app_data(oauth_cache.clone())
            .service(web::scope("/health_check").service(routes::health_check))
            .service(
                web::scope("/api/live-chat")
                    .service(routes::live_chat::queue_handler)
                    .service(routes::live_chat::active_handler)
                    .service(routes::live_chat::availability_handler)
                    .service(routes::live_chat::request_handler)
                    .service(routes::live_chat::accept_handler)
                    .service(routes::live_chat::end_handler)
                    .service(routes::live_chat::agent_message_handler)
                    .service(routes::live_chat::user_message_handler)
                    .service(routes::live_chat::poll_handler)
                    .service(routes::live_chat::stream_handler),
            )
            .app_data(json_config.clone())
            .app_data(live_chat.clone())
            .app_data(hub.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
