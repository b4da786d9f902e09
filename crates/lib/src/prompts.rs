//! # Default Task Prompts
//!
//! The default, hardcoded prompt templates for the two AI tasks. They are loaded
//! programmatically by the server configuration and can be overridden in `config.yml`.

// --- Fact Verdict (generative fallback of the provider chain) ---

/// Placeholders: none.
pub const FACT_VERDICT_SYSTEM_PROMPT: &str = r#"You are a fact-checking assistant. Analyze the user's claim and provide a verdict.
Respond with a single JSON object and nothing else:
{"text": "the claim as stated", "claimant": "who made the claim, if known", "rating": "True | False | Mixture | Misleading | Unverified", "publisher": "AI Fact Checker", "date": "", "url": ""}"#;

/// Placeholders: `{claim}`, `{context}`
pub const FACT_VERDICT_USER_PROMPT: &str = r#"# Claim
{claim}

# Context
{context}"#;

// --- Claim Analysis ---

/// Placeholders: none.
pub const CLAIM_ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert Fact Checker and Disinformation Analyst.
Analyze the following text and classify it into exactly one of these categories:
- Factual Statement (verified truth)
- Scientific Fact (established scientific knowledge)
- Disinformation (false, malicious)
- Deceptive Context (misleading, cherry-picked)
- Unverifiable (opinion, lack of data)

Use the verification context when it is relevant. Provide a confidence score (0-100) and a brief, professional reason (max 2 sentences).

Return JSON format: {"label": "CATEGORY", "score": number, "reason": "string"}"#;

/// Placeholders: `{claim}`, `{context}`
pub const CLAIM_ANALYSIS_USER_PROMPT: &str = r#"# Text
{claim}

# Verification Context
{context}"#;

/// Fills the `{claim}` and `{context}` placeholders of a task template.
pub fn render(template: &str, claim: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        "None available."
    } else {
        context
    };
    template
        .replace("{claim}", claim)
        .replace("{context}", context)
}
