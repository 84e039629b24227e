use clap::Parser;
use std::path::PathBuf;

/// appkernel - 请求处理脚手架
#[derive(Parser, Debug)]
#[command(name = "appkernel")]
#[command(about = "服务容器、请求上下文、会话/CSRF 与翻译的 Web 脚手架")]
pub struct Args {
    /// 子命令
    #[command(subcommand)]
    pub command: Command,

    /// 配置文件路径（默认 config/settings.toml 或 APP_CONFIG）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub enum Command {
    /// 启动 HTTP 服务
    Serve {
        /// 监听地址
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// 构建容器并解析全部服务
    Check,
    /// 从标准输入读取 JSON，经 ping 动作原样输出
    Ping,
}
