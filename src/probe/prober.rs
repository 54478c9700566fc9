//! HTTP链接探测器实现
//!
//! 先发送HEAD请求；HEAD在网络层失败或返回405时，改用GET请求重试一次，
//! 响应体分块写入丢弃的sink，不在内存中缓存。

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::probe::guard::{ensure_safe_host, validate_url, GuardedResolver};
use crate::probe::result::{CheckOutcome, ProbeMethod, ProbeResult};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode, Url};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 链接探测器trait
#[async_trait]
pub trait UrlProber: Send + Sync {
    /// 探测链接并给出结论
    ///
    /// # 参数
    /// * `url` - 待探测的链接，可以为空或格式错误
    ///
    /// # 返回
    /// * `ProbeResult` - 探测结果，网络错误也体现在结论中
    async fn check(&self, url: &str) -> ProbeResult;
}

/// 基于reqwest的HTTP链接探测器
pub struct HttpUrlProber {
    /// HTTP客户端
    client: Client,
    /// 是否允许内网地址
    allow_private_networks: bool,
}

impl HttpUrlProber {
    /// 创建新的HTTP链接探测器
    ///
    /// # 参数
    /// * `config` - 探测配置
    ///
    /// # 返回
    /// * `Result<Self, ProbeError>` - 探测器实例
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let timeout = config.timeout();
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", crate::APP_NAME, crate::VERSION));

        let mut builder = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(Self::redirect_policy(
                config.max_redirects,
                config.allow_private_networks,
            ))
            .danger_accept_invalid_certs(false)
            .user_agent(user_agent);

        if !config.allow_private_networks {
            // 代理会替我们解析域名，绕过解析器的内网过滤
            builder = builder
                .no_proxy()
                .dns_resolver(Arc::new(GuardedResolver));
        }

        Ok(Self {
            client: builder.build()?,
            allow_private_networks: config.allow_private_networks,
        })
    }

    /// 重定向策略：限制次数，并检查每一跳的目标地址
    fn redirect_policy(max_redirects: usize, allow_private_networks: bool) -> Policy {
        Policy::custom(move |attempt| {
            match check_redirect_hop(
                attempt.url(),
                attempt.previous().len(),
                max_redirects,
                allow_private_networks,
            ) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        })
    }

    /// 把GET响应体写入丢弃的sink
    ///
    /// 状态码已经确定，读取中断只记录调试日志。
    async fn drain_body(mut response: Response) -> u64 {
        let mut sink = tokio::io::sink();
        let mut total: u64 = 0;

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    total += chunk.len() as u64;
                    if sink.write_all(&chunk).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("读取响应体中断: {}", format_request_error(&e));
                    break;
                }
            }
        }

        total
    }

    /// 创建网络错误结果
    fn network_error(method: ProbeMethod, start: Instant, message: String) -> ProbeResult {
        ProbeResult::new(CheckOutcome::NetworkError, method)
            .with_response_time(start.elapsed())
            .with_error(message)
    }

    /// 创建HTTP响应结果
    fn confirmed(method: ProbeMethod, start: Instant, status: StatusCode) -> ProbeResult {
        ProbeResult::new(CheckOutcome::from_status(status.as_u16()), method)
            .with_response_time(start.elapsed())
    }

    async fn probe(&self, url: Url) -> ProbeResult {
        let start = Instant::now();

        if !self.allow_private_networks {
            if let Err(e) = ensure_safe_host(&url) {
                return Self::network_error(ProbeMethod::None, start, e.to_string());
            }
        }

        match self.client.head(url.clone()).send().await {
            Ok(response) if response.status() != StatusCode::METHOD_NOT_ALLOWED => {
                return Self::confirmed(ProbeMethod::Head, start, response.status());
            }
            Ok(_) => debug!("HEAD返回405，改用GET: {}", url),
            Err(e) => debug!("HEAD请求失败，改用GET: {} - {}", url, format_request_error(&e)),
        }

        match self.client.get(url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                let size = Self::drain_body(response).await;
                debug!("GET {} -> {}，丢弃响应体 {} 字节", url, status.as_u16(), size);
                Self::confirmed(ProbeMethod::Get, start, status)
            }
            Err(e) => Self::network_error(ProbeMethod::Get, start, format_request_error(&e)),
        }
    }
}

#[async_trait]
impl UrlProber for HttpUrlProber {
    async fn check(&self, url: &str) -> ProbeResult {
        match validate_url(url) {
            Some(url) => self.probe(url).await,
            None => ProbeResult::skipped(),
        }
    }
}

/// 检查单个重定向跳转
///
/// # 参数
/// * `url` - 本跳目标
/// * `previous_hops` - 已经经过的链接数
/// * `max_redirects` - 最大重定向次数
/// * `allow_private_networks` - 是否允许内网地址
pub(crate) fn check_redirect_hop(
    url: &Url,
    previous_hops: usize,
    max_redirects: usize,
    allow_private_networks: bool,
) -> Result<(), ProbeError> {
    if previous_hops > max_redirects {
        return Err(ProbeError::TooManyRedirects { max: max_redirects });
    }
    if !allow_private_networks {
        ensure_safe_host(url)?;
    }
    Ok(())
}

/// 在错误来源链中查找主动拒绝请求的原因
fn find_rejection(error: &reqwest::Error) -> Option<&ProbeError> {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(inner) = source {
        if let Some(rejection) = inner.downcast_ref::<ProbeError>() {
            return Some(rejection);
        }
        source = inner.source();
    }
    None
}

/// 格式化请求错误信息，使其更加清晰易读
pub fn format_request_error(error: &reqwest::Error) -> String {
    match find_rejection(error) {
        Some(ProbeError::UnsafeTarget { .. }) => return "Unsafe target rejected".to_string(),
        Some(ProbeError::TooManyRedirects { .. }) => return "Too many redirects".to_string(),
        _ => {}
    }

    let chain = error_chain(error);

    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_redirect() {
        "Too many redirects".to_string()
    } else if error.is_connect() {
        let lower = chain.to_lowercase();
        if lower.contains("dns") || lower.contains("resolve") || lower.contains("lookup") {
            "DNS resolution failed".to_string()
        } else if lower.contains("certificate") || lower.contains("tls") {
            "SSL/TLS certificate error".to_string()
        } else {
            "Connection refused".to_string()
        }
    } else if error.is_request() {
        "Invalid request".to_string()
    } else {
        format!("Request failed: {chain}")
    }
}

/// 拼接错误及其来源链
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
