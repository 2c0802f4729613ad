//! Prompt templates sent to the language model.
//!
//! The parsers depend on the markers these templates ask for (`ВОПРОС n:`,
//! `СЛОВО n:`, `ERRORS_FOUND:` ...), so a change here usually needs a
//! matching change in the corresponding parser.

use crate::dialogue::Role;
use crate::quiz::TenseType;

pub fn grammar_test(tense: TenseType) -> String {
    format!(
        "Создай тест по английской грамматике на тему: {}.

Требования:
1. Тест должен содержать 10 вопросов
2. Каждый вопрос должен иметь 4 варианта ответа (a, b, c, d)
3. Только один вариант ответа правильный
4. Вопросы должны быть разного уровня сложности

Формат вывода - используй ТОЧНО такой текстовый формат для КАЖДОГО вопроса:

ВОПРОС 1:
Текст вопроса здесь
a) первый вариант
b) второй вариант
c) третий вариант
d) четвертый вариант
ОТВЕТ: a
ОБЪЯСНЕНИЕ: объяснение почему этот ответ правильный

ВОПРОС 2:
...и так далее для всех 10 вопросов.

Начни прямо с \"ВОПРОС 1:\" без вступления.",
        tense.description()
    )
}

pub fn vocabulary(topic: &str, count: usize) -> String {
    format!(
        "Создай список из {count} английских слов для изучения по теме: \"{topic}\".

Для КАЖДОГО слова используй ТОЧНО такой текстовый формат:

СЛОВО 1:
Английское: apple
Транскрипция: [ˈæpl]
Перевод: яблоко
Пример EN: I eat an apple every day.
Пример RU: Я ем яблоко каждый день.

СЛОВО 2:
Английское: banana
Транскрипция: [bəˈnænə]
Перевод: банан
Пример EN: Bananas are yellow and sweet.
Пример RU: Бананы желтые и сладкие.

...и так далее для всех {count} слов.

Важно: начни сразу со \"СЛОВО 1:\" без вступления. Тема: {topic}"
    )
}

pub fn grammar_check(user_text: &str) -> String {
    format!(
        "Analyze the following English text for grammar, spelling, and vocabulary errors.

Text to analyze: \"{user_text}\"

IMPORTANT RULES:
1. DO NOT count punctuation errors (missing periods, commas, apostrophes, etc.)
2. DO NOT count capitalization errors
3. ONLY check for real grammar mistakes, spelling errors, and wrong word usage
4. If the text is grammatically correct but missing punctuation - report 0 errors

Use EXACTLY this format for your response:

ERRORS_FOUND: [number of REAL grammar/spelling errors, use 0 if no errors]
CORRECTED: [corrected version of the text, or \"No corrections needed\" if perfect]
MISTAKES:
[If there are REAL errors, list each one like this:]
- Original: [wrong part] -> Correct: [right version] | Explanation: [brief explanation in Russian]

[If no errors, write:]
- No mistakes found. Great job!

Example response for text with errors:
ERRORS_FOUND: 2
CORRECTED: I want to buy a red apple.
MISTAKES:
- Original: \"wont\" -> Correct: \"want\" | Explanation: Опечатка, \"wont\" означает \"привычка\"
- Original: \"a apple\" -> Correct: \"an apple\" | Explanation: Перед гласной используется артикль \"an\"

Now analyze the text."
    )
}

const SELLER_INSTRUCTION: &str = "You are a friendly shop assistant/seller in a store.
Your task is to help the customer choose products, answer their questions, and suggest alternatives.

IMPORTANT RULES:
1. Respond ONLY in English
2. Be polite, professional, and helpful
3. Use simple, clear English suitable for language learners
4. Keep responses short (2-4 sentences)
5. Ask follow-up questions to engage the customer";

const BUYER_INSTRUCTION: &str = "You are a customer in a store.
Your task is to ask about products, inquire about prices and features.

IMPORTANT RULES:
1. Respond ONLY in English
2. Be polite and curious
3. Use simple, clear English suitable for language learners
4. Keep responses short (2-4 sentences)
5. Ask questions about products you're interested in";

/// System instruction for the role the model plays.
pub fn dialogue_instruction(ai_role: Role) -> &'static str {
    match ai_role {
        Role::Seller => SELLER_INSTRUCTION,
        Role::Buyer => BUYER_INSTRUCTION,
    }
}

pub fn dialogue_continuation(transcript: &str, ai_label: &str) -> String {
    format!(
        "Continue the following store dialogue:\n\n{}\nYour response as {} (in English only):",
        transcript, ai_label
    )
}
