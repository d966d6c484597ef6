use anyhow::Result;
use url::Url;

/// 只接受 http/https URL
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => matches!(u.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

pub fn validate_worker_count(workers: usize) -> Result<()> {
    if workers == 0 {
        anyhow::bail!("worker数必须大于0");
    }
    Ok(())
}

pub fn validate_urls(urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        anyhow::bail!("URL列表不能为空");
    }
    for url in urls {
        if !is_valid_url(url) {
            anyhow::bail!("无效的URL: {}", url);
        }
    }
    Ok(())
}
