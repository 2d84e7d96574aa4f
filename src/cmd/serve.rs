use anyhow::Result;

use clipd::ServiceConfig;

pub async fn cmd_serve(config: ServiceConfig, bind: Option<String>) -> Result<()> {
    let mut config = config.with_port_override(std::env::var("PORT").ok().as_deref());
    if let Some(bind) = bind {
        config.bind = bind;
    }

    clipd::server::serve(config).await
}
