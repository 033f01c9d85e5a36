//! Prompt templates and fixed replies

use crate::config::ContactInfo;

const ROUTER_PROMPT: &str = "\
You are a router for a customer support assistant.

Classify the query into ONE word only:
- rag : orders, payments, shipping, returns, gift cards, company info, product questions
- contact : contact us, customer support, help, phone number, email, whatsapp, reach out, get in touch
- booking : booking calls or meetings, schedule appointment
- greeting : hi, hello, hey, thanks, thank you, goodbye, bye, ok, okay, yes, no (simple greetings/acknowledgments)
- fallback : anything else not related to customer support

Return ONLY one word.
";

pub const NO_INFORMATION: &str = "This information is not available in our help content.";

pub const RETRIEVAL_UNAVAILABLE: &str = "Our knowledge base is temporarily unavailable, so I can't look that up right now. Please try again in a few minutes.";

pub const ANSWER_FAILED: &str =
    "I'm sorry, I couldn't put together an answer just now. Please try asking again.";

pub const GREETING_FAILED: &str = "Hi there! 👋 How can I help you today?";

pub const FALLBACK_FAILED: &str = "I can help with orders, payments, shipping, returns, gift cards, company info and booking a support call. What can I assist you with?";

pub fn router(query: &str) -> String {
    format!("{ROUTER_PROMPT}\n\nQuery: {query}")
}

/// Grounded answer prompt; the model may only use `context`
pub fn answer(brand: &str, context: &str, question: &str) -> String {
    format!(
        "You are a {brand} customer support assistant.

Use the provided context to answer the user's question. The context contains Q&A pairs from our help documentation.

RULES:
- Answer only from the provided context; never add facts that are not in it
- Combine information from multiple Q&A pairs if relevant
- Be helpful and conversational while staying accurate
- If the context doesn't contain relevant information, say: \"I don't have specific information about that in our help content.\"

Context:
{context}

User question:
{question}

Answer:
"
    )
}

pub fn greeting(brand: &str, query: &str) -> String {
    format!(
        "You are a friendly customer support assistant for {brand}.

The user said: \"{query}\"

Respond naturally and warmly. Keep it brief (1-2 sentences).

Guidelines:
- For \"hi/hello/hey\": Greet warmly and ask how you can help
- For \"thanks/thank you\": Acknowledge warmly and offer further help
- For \"ok/okay/yes/no\": Respond naturally and ask if they need anything else
- For \"bye/goodbye\": Say goodbye warmly
- Be conversational, not robotic
- Don't list all services unless asked

Examples:
User: \"hi\" → \"Hi there! 👋 How can I help you today?\"
User: \"thanks\" → \"You're welcome! 😊 Let me know if you need anything else.\"
User: \"ok\" → \"Great! Is there anything else I can help you with?\"
"
    )
}

pub fn fallback(brand: &str, query: &str) -> String {
    format!(
        "You are a friendly customer support assistant for {brand}.

The user asked: \"{query}\"

This is outside your scope (you help with orders, payments, shipping, returns, gift cards, company info, contact details, and booking meetings).

Respond warmly but redirect them to what you CAN help with. Keep it brief and natural (2-3 sentences max).

Example:
User: \"What's the weather?\" → \"I'm focused on helping with {brand} customer support, so I can't help with weather info. But I'd be happy to help with your orders, shipping questions, or booking a support call! What can I assist you with?\"
"
    )
}

/// Slot list shown after a successful availability lookup
pub fn booking_slots(numbered: &str, count: usize) -> String {
    format!(
        "I'd be happy to help you book a meeting! 📅\n\n\
         Here are the next available time slots:\n\n\
         {numbered}\n\n\
         **Please reply with the number (1-{count}) of your preferred slot**, \
         and I'll schedule the meeting for you."
    )
}

pub fn booking_no_slots(contact: &ContactInfo) -> String {
    format!(
        "I'd like to help you book a meeting, but I'm having trouble \
         accessing the calendar right now. Please contact us directly:\n\n{}",
        contact.direct_lines()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_prompt_embeds_context_and_question() {
        let prompt = answer("Acme", "Question: a\nAnswer: b", "Do you ship?");
        assert!(prompt.starts_with("You are a Acme customer support assistant."));
        assert!(prompt.contains("Context:\nQuestion: a\nAnswer: b\n\nUser question:\nDo you ship?"));
    }

    #[test]
    fn test_booking_slots_prompt() {
        let text = booking_slots("**1.** Monday", 1);
        assert!(text.contains("**1.** Monday"));
        assert!(text.contains("(1-1)"));
    }
}
