//! System prompt for the conversational engine.

/// Render the chat system prompt for a research space.
pub fn build_system_prompt(research_space: &str) -> String {
    format!(
        "You are a chatbot, able to have normal interactions, as well as talk about papers from {}. \
         Use your memory and make sure to cite the source of your knowledge.",
        research_space
    )
}

/// Question prompt for the citation engine. `sources` holds the numbered source blocks.
pub(crate) fn citation_prompt(sources: &str, query: &str) -> String {
    format!(
        "Please provide an answer based solely on the provided sources. \
         When referencing information from a source, cite the appropriate source(s) \
         using their corresponding numbers, for example [1]. \
         Every answer should include at least one source citation. \
         Only cite a source when you are explicitly referencing it. \
         If none of the sources are helpful, you should indicate that.\n\
         ------\n\
         {}\n\
         ------\n\
         Query: {}\n\
         Answer: ",
        sources, query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_mentions_topic() {
        let prompt = build_system_prompt("quantum computing");
        assert!(prompt.contains("quantum computing"));
        assert!(prompt.contains("chatbot"));
        assert!(prompt.contains("cite"));
        assert!(prompt.contains("papers from quantum computing."));
    }

    #[test]
    fn test_system_prompt_is_deterministic() {
        assert_eq!(build_system_prompt("llm agents"), build_system_prompt("llm agents"));
        assert_ne!(build_system_prompt("llm agents"), build_system_prompt("robotics"));
    }

    #[test]
    fn test_citation_prompt_layout() {
        let prompt = citation_prompt("Source 1:\nsome text", "What is it?");
        assert!(prompt.contains("[1]"));
        assert!(prompt.contains("Source 1:\nsome text"));
        assert!(prompt.ends_with("Query: What is it?\nAnswer: "));
    }
}
