// Persona prompts built from the loaded profile document.

use crate::profile::ProfileDocument;

/// Used when neither config nor the profile names the persona.
pub const DEFAULT_PERSONA: &str = "the candidate";

pub const PERSONA_SYSTEM_TEMPLATE: &str = "\
You are {persona}, a fullstack software engineer whose professional experience and skills center \
around fullstack software development, cloud computing, and AI integration.

All professional information can be found here:
{profile}

Respond to all user questions using only the information provided in this JSON structure, \
analyzing the data and providing the best answer in a conversational format in full, complete \
sentences. Do not fabricate or assume any details beyond what is explicitly stated in the JSON. \
If you are asked any questions that are not related to software engineering, fullstack \
development, cloud computing, or AI integration, politely inform the user that you can only \
provide information related to your professional expertise as outlined in the JSON. The only \
exception is a question about specific information found within the professional information JSON.

Responses should be concise, conversational, and professional. Although you have access to \
detailed information, avoid overwhelming the user with excessive detail unless specifically \
requested.";

pub const WELCOME_TEMPLATE: &str = "Hello! I'm {persona}, a full stack software engineer. \
Feel free to ask me about my experience, skills, or any projects I've worked on. \
How can I help you today?";

/// Resolves the persona name: explicit override, then the profile's own name.
pub fn persona_name<'a>(override_name: Option<&'a str>, profile: &'a ProfileDocument) -> &'a str {
    override_name
        .or_else(|| profile.display_name())
        .unwrap_or(DEFAULT_PERSONA)
}

pub fn build_system_prompt(persona: &str, profile: &ProfileDocument) -> String {
    PERSONA_SYSTEM_TEMPLATE
        .replace("{persona}", persona)
        .replace("{profile}", &profile.to_prompt_text())
}

pub fn build_welcome(persona: &str) -> String {
    WELCOME_TEMPLATE.replace("{persona}", persona)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_embeds_profile_and_persona() {
        let profile =
            ProfileDocument::from_json_str(r#"{"SKILLS": ["Rust", "AWS"]}"#, "inline").unwrap();
        let prompt = build_system_prompt("Jordan Reyes", &profile);
        assert!(prompt.starts_with("You are Jordan Reyes"));
        assert!(prompt.contains("\"Rust\""));
        assert!(!prompt.contains("{profile}"));
    }

    #[test]
    fn test_system_prompt_with_empty_profile() {
        let prompt = build_system_prompt(DEFAULT_PERSONA, &ProfileDocument::default());
        assert!(prompt.contains("found here:\n{}"));
    }

    #[test]
    fn test_persona_name_precedence() {
        let named = ProfileDocument::from_json_str(r#"{"name": "Jordan"}"#, "inline").unwrap();
        assert_eq!(persona_name(Some("Sam"), &named), "Sam");
        assert_eq!(persona_name(None, &named), "Jordan");
        assert_eq!(persona_name(None, &ProfileDocument::default()), DEFAULT_PERSONA);
    }

    #[test]
    fn test_welcome_mentions_persona() {
        assert!(build_welcome("Jordan").starts_with("Hello! I'm Jordan,"));
    }
}
