//! Localized interface copy for the assistant.

use crate::config::Language;

/// Static copy for one interface language.
#[derive(Debug, Clone, Copy)]
pub struct UiCopy {
    pub heading: &'static str,
    pub role_label: &'static str,
    pub greeting: &'static str,
    pub initial_placeholder: &'static str,
    pub conversation_placeholder: &'static str,
    pub typing_label: &'static str,
    pub submit_label: &'static str,
    /// Shown in place of the pending reply when a request fails.
    pub failure_fallback: &'static str,
    pub quick_prompts: &'static [&'static str],
}

const PT_BR: UiCopy = UiCopy {
    heading: "Stanley IA",
    role_label: "Assistente de IA",
    greeting: "Olá! Sou a Stanley IA, assistente pessoal do Stanley. Estou aqui para te ajudar a conhecer o Stanley, responder perguntas sobre ele.",
    initial_placeholder: "Digite sua pergunta aqui...",
    conversation_placeholder: "Pergunte algo para a Stanley IA...",
    typing_label: "Stanley IA está digitando",
    submit_label: "Enviar pergunta",
    failure_fallback: "Desculpe, algo deu errado ao falar com a Stanley IA. Tente novamente em instantes.",
    quick_prompts: &[
        "Como você funciona?",
        "Quem é Stanley?",
        "Onde Stanley trabalhou?",
    ],
};

const EN_US: UiCopy = UiCopy {
    heading: "Stanley AI",
    role_label: "AI assistant",
    greeting: "Hi! I'm Stanley AI, Stanley's personal assistant. I'm here to help you get to know Stanley and answer questions about him.",
    initial_placeholder: "Type your question here...",
    conversation_placeholder: "Ask something to Stanley AI...",
    typing_label: "Stanley AI is typing",
    submit_label: "Send question",
    failure_fallback: "Sorry, something went wrong while talking to Stanley AI. Please try again in a moment.",
    quick_prompts: &[
        "How do you work?",
        "Who is Stanley?",
        "Where has Stanley worked?",
    ],
};

pub fn ui_copy(language: Language) -> &'static UiCopy {
    match language {
        Language::PtBr => &PT_BR,
        Language::EnUs => &EN_US,
    }
}
