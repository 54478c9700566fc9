//! 链接校验和SSRF防护
//!
//! 拒绝指向私有、回环、链路本地等内网地址的请求。IP字面量在发起请求前检查，
//! 域名在DNS解析阶段过滤，重定向的每一跳都会重新检查。

use crate::error::ProbeError;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// 校验链接格式，仅接受带主机名的http/https链接
///
/// # 参数
/// * `raw` - 原始链接字符串
///
/// # 返回
/// * `Option<Url>` - 合法时返回解析后的链接
pub fn validate_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let url = Url::parse(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

/// 判断IP是否为可公开访问的地址
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_ipv4(v4),
        IpAddr::V6(v6) => is_public_ipv6(v6),
    }
}

fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    let this_network = octets[0] == 0;
    // 100.64.0.0/10 运营商级NAT
    let shared = octets[0] == 100 && (octets[1] & 0xc0) == 64;
    // 198.18.0.0/15 基准测试网段
    let benchmarking = octets[0] == 198 && (octets[1] & 0xfe) == 18;
    // 240.0.0.0/4 保留地址，包含广播地址
    let reserved = octets[0] >= 240;

    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_documentation()
        || this_network
        || shared
        || benchmarking
        || reserved)
}

fn is_public_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_ipv4(v4);
    }

    let segments = ip.segments();
    // 64:ff9b::/96 NAT64，按内嵌的IPv4地址判断
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        let o = ip.octets();
        return is_public_ipv4(Ipv4Addr::new(o[12], o[13], o[14], o[15]));
    }

    let first = segments[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    // fec0::/10 已废弃的站点本地地址
    let site_local = (first & 0xffc0) == 0xfec0;
    let documentation = first == 0x2001 && segments[1] == 0x0db8;

    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || site_local
        || documentation)
}

/// 检查链接中的IP字面量主机
///
/// 域名主机直接放行，由 [`GuardedResolver`] 在解析时检查。
pub fn ensure_safe_host(url: &Url) -> Result<(), ProbeError> {
    let host = url.host_str().unwrap_or_default();
    let bare = host.trim_start_matches('[').trim_end_matches(']');

    match bare.parse::<IpAddr>() {
        Ok(ip) if !is_public_ip(ip) => Err(ProbeError::UnsafeTarget {
            host: host.to_string(),
        }),
        _ => Ok(()),
    }
}

/// 过滤内网地址的DNS解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct GuardedResolver;

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(name.as_str().to_string()))
    }
}

async fn resolve_public(host: String) -> Result<Addrs, Box<dyn std::error::Error + Send + Sync>> {
    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();

    let public: Vec<SocketAddr> = resolved
        .into_iter()
        .filter(|addr| is_public_ip(addr.ip()))
        .collect();

    if public.is_empty() {
        return Err(Box::new(ProbeError::UnsafeTarget { host }));
    }

    Ok(Box::new(public.into_iter()))
}
