use ante_core::config::Config;
use ante_server::Runtime;

pub fn run(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let runtime = Runtime::open(config)?;
        ante_server::serve(runtime).await
    })
}
