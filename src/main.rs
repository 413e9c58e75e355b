use anyhow::Result;
use clap::Parser;
use quiz_router::utils::logging;
use quiz_router::{App, Cli, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.log_json);

    let cli = Cli::parse();

    // 初始化并运行应用
    let output = App::initialize(config)?.run(&cli.command).await?;
    println!("{}", output);

    Ok(())
}
