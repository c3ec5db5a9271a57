//! 从求职意向中提取职位 / 公司，并生成会话默认名称

use std::sync::OnceLock;

use regex::Regex;

use crate::document::Resume;

const COMPANY_PATTERNS: &[&str] = &[
    r"([^\s，。！？,.!?]{2,15}(?:公司|集团|科技|互联网|网络|技术|软件|信息|数据|智能))",
    r"(字节跳动|腾讯|阿里巴巴|百度|美团|京东|拼多多|快手|小米|华为|OPPO|vivo)",
    r"(?:\bat|@)\s*([A-Z][\w&.-]*(?:\s+[A-Z][\w&.-]*)*)",
];

const TITLE_PATTERNS: &[&str] = &[
    r"((?:前端|后端|全栈|算法|机器学习|深度学习|数据|测试|运维|安全|产品|设计|UI|UX)(?:研发|开发)?工程师)",
    r"((?:Java|Python|Go|C\+\+|前端|后端|全栈|算法|大数据|AI)(?:开发|工程师))",
    r"([^\s，。！？,.!?]{2,10}(?:工程师|开发|架构师|专家|经理|总监))",
    r"(?i)((?:senior |junior |staff |lead )?[a-z+#]+(?: [a-z+#]+)? (?:engineer|developer|manager|designer|scientist|analyst|architect))",
];

static COMPANY_RE: OnceLock<Vec<Regex>> = OnceLock::new();
static TITLE_RE: OnceLock<Vec<Regex>> = OnceLock::new();
static PUNCT_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn first_capture(regexes: &[Regex], text: &str) -> Option<String> {
    regexes.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// 职位与公司；未识别的字段为 None
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobInfo {
    pub title: Option<String>,
    pub company: Option<String>,
}

/// 按模式依次匹配；职位未命中时取第一行去掉标点后的前 20 个字符
pub fn extract_job_info(intent: &str) -> JobInfo {
    let company = first_capture(COMPANY_RE.get_or_init(|| compile(COMPANY_PATTERNS)), intent);
    let title = first_capture(TITLE_RE.get_or_init(|| compile(TITLE_PATTERNS)), intent).or_else(|| {
        let first_line = intent.lines().next().unwrap_or("").trim();
        let cleaned = match PUNCT_RE.get_or_init(|| Regex::new(r"[^\w\s]").ok()) {
            Some(re) => re.replace_all(first_line, "").into_owned(),
            None => first_line.to_string(),
        };
        let cleaned: String = cleaned.trim().chars().take(20).collect();
        (!cleaned.is_empty()).then_some(cleaned)
    });
    tracing::debug!(?title, ?company, "Extracted job info");
    JobInfo { title, company }
}

/// 默认会话名：`{姓名} - {职位} - {公司}`，缺失部分省略
pub fn generate_session_name(document: &Resume, intent: &str) -> String {
    let name = match document.basics.name.trim() {
        "" => "未命名",
        n => n,
    };
    let info = extract_job_info(intent);
    match (info.title, info.company) {
        (Some(t), Some(c)) => format!("{} - {} - {}", name, t, c),
        (Some(t), None) => format!("{} - {}", name, t),
        (None, Some(c)) => format!("{} - {}", name, c),
        (None, None) => format!("{} - 简历优化", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_chinese_intent() {
        let info = extract_job_info("应聘字节跳动后端开发工程师，负责推荐系统");
        assert_eq!(info.company.as_deref(), Some("字节跳动"));
        assert_eq!(info.title.as_deref(), Some("后端开发工程师"));
    }

    #[test]
    fn test_extract_english_intent() {
        let info = extract_job_info("Senior Backend Engineer at Acme Corp, Rust and Kafka");
        assert_eq!(info.company.as_deref(), Some("Acme Corp"));
        assert_eq!(info.title.as_deref(), Some("Senior Backend Engineer"));
    }

    #[test]
    fn test_title_falls_back_to_first_line() {
        let info = extract_job_info("想做增长运营！\n其他说明");
        assert_eq!(info.title.as_deref(), Some("想做增长运营"));
        assert_eq!(info.company, None);
        assert_eq!(extract_job_info("   ").title, None);
    }

    #[test]
    fn test_generate_session_name() {
        let mut doc = Resume::default();
        doc.basics.name = "张三".to_string();
        assert_eq!(
            generate_session_name(&doc, "腾讯 前端工程师"),
            "张三 - 前端工程师 - 腾讯"
        );
        doc.basics.name = String::new();
        assert_eq!(generate_session_name(&doc, ""), "未命名 - 简历优化");
    }
}
