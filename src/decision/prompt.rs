//! 决策与回答提示词

use crate::decision::schema::decision_schema_json;
use crate::decision::{AnswerRequest, DecisionRequest, Preference};
use crate::memory::{RetrievedDocument, Speaker, Turn, TurnPair};

pub const SYSTEM_PROMPT: &str = "You are a meticulous research assistant that cites sources.";

fn context_section(context: &[String]) -> String {
    if context.is_empty() {
        "none".to_string()
    } else {
        context.join("\n\n")
    }
}

fn documents_section(documents: &[RetrievedDocument]) -> String {
    if documents.is_empty() {
        return "none".to_string();
    }
    documents
        .iter()
        .map(|d| format!("- Source: {}\n  Excerpt: {}", d.source, d.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn memory_section(recalled: Option<&TurnPair>, recent: &[Turn]) -> String {
    let mut lines = Vec::new();
    if let Some(pair) = recalled {
        lines.push(format!(
            "Relevant earlier exchange:\nUser: {}\nAssistant: {}",
            pair.user.text(),
            pair.agent.text()
        ));
    }
    if !recent.is_empty() {
        lines.push("Recent conversation:".to_string());
        for turn in recent {
            let who = match turn.role() {
                Speaker::User => "User",
                Speaker::Agent => "Assistant",
            };
            lines.push(format!("{}: {}", who, turn.text()));
        }
    }
    if lines.is_empty() {
        "none".to_string()
    } else {
        lines.join("\n")
    }
}

/// 决策提示词：列出可用动作、工具与偏好
pub fn decision_prompt(req: &DecisionRequest<'_>) -> String {
    let mut actions = Vec::new();
    if req.capabilities.web_search {
        actions.push("- search: look the question up on the web (give search_query)");
    }
    if req.capabilities.retrieval && !req.retrieval_attempted {
        actions.push("- retrieve: query the local knowledge base with the question");
    }
    if !req.tools.is_empty() {
        actions.push("- tool: call one of the tools listed below (give tool and args)");
    }
    actions.push("- answer: enough information has been gathered");

    let tools = if req.tools.is_empty() {
        "none".to_string()
    } else {
        req.tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prefer = match req.prefer {
        Preference::Search => "search",
        Preference::Retrieve => "retrieve",
    };

    format!(
        "You orchestrate tools for a research agent.\n\n\
QUESTION: {question}\n\n\
MEMORY:\n{memory}\n\n\
SEARCH CONTEXT:\n{context}\n\n\
RAG RESULTS:\n{documents}\n\n\
AVAILABLE ACTIONS:\n{actions}\n\n\
TOOLS:\n{tools}\n\n\
If both search and retrieve look useful, prefer {prefer}. \
If no action would add information beyond the context above, choose answer.\n\n\
Decide the next action. Return only JSON matching this schema:\n{schema}\n",
        question = req.question,
        memory = memory_section(req.recalled, req.recent_turns),
        context = context_section(req.context),
        documents = documents_section(req.documents),
        actions = actions.join("\n"),
        tools = tools,
        prefer = prefer,
        schema = decision_schema_json(),
    )
}

/// 回答提示词：要求内联 (Source) 引用
pub fn answer_prompt(req: &AnswerRequest<'_>) -> String {
    let rag = if req.documents.is_empty() {
        "None".to_string()
    } else {
        req.documents
            .iter()
            .map(|d| format!("Source: {}\nExcerpt: {}", d.source, d.text))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let sources = if req.sources.is_empty() {
        "None".to_string()
    } else {
        req.sources.join("\n")
    };
    format!(
        "Answer the user's question using the research context and retrieved documents.\n\
If uncertain, say so.\n\n\
Question: {question}\n\n\
Conversation memory:\n{memory}\n\n\
Search Context:\n{context}\n\n\
Retrieved Documents:\n{rag}\n\n\
Known sources:\n{sources}\n\n\
Provide a concise answer and cite sources inline using (Source).\n",
        question = req.question,
        memory = memory_section(req.recalled, req.recent_turns),
        context = context_section(req.context),
        rag = rag,
        sources = sources,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Capabilities;
    use crate::tools::ToolDescriptor;

    fn request<'a>(tools: &'a [ToolDescriptor], caps: Capabilities) -> DecisionRequest<'a> {
        DecisionRequest {
            question: "Will it rain in Paris?",
            context: &[],
            documents: &[],
            recalled: None,
            recent_turns: &[],
            tools,
            capabilities: caps,
            prefer: Preference::Search,
            retrieval_attempted: false,
        }
    }

    #[test]
    fn test_decision_prompt_lists_only_available_actions() {
        let prompt = request(&[], Capabilities { web_search: false, retrieval: true });
        let text = decision_prompt(&prompt);
        assert!(!text.contains("- search:"));
        assert!(text.contains("- retrieve:"));
        assert!(!text.contains("- tool:"));
        assert!(text.contains("prefer search"));
    }

    #[test]
    fn test_decision_prompt_includes_tools() {
        let tools = [ToolDescriptor {
            name: "weather_get_weather".into(),
            backend: "weather".into(),
            description: "[WEATHER] current conditions".into(),
        }];
        let text = decision_prompt(&request(&tools, Capabilities::default()));
        assert!(text.contains("- weather_get_weather: [WEATHER] current conditions"));
        assert!(text.contains("- tool:"));
    }

    #[test]
    fn test_answer_prompt_requests_citations() {
        let sources = vec!["https://example.com".to_string()];
        let context = vec!["Example - https://example.com\nsnippet".to_string()];
        let req = AnswerRequest {
            question: "q",
            context: &context,
            documents: &[],
            recalled: None,
            recent_turns: &[],
            sources: &sources,
        };
        let text = answer_prompt(&req);
        assert!(text.contains("cite sources inline using (Source)"));
        assert!(text.contains("https://example.com"));
    }
}
