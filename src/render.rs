//! Chat messages for everything the tutor returns. All text is Telegram
//! HTML; anything that came from the user or the model is escaped.

use teloxide::utils::html::{bold, escape, italic};

use crate::dialogue::{DialogueReply, DialogueStats, GrammarCheckResult, Role};
use crate::error::TutorError;
use crate::quiz::{QuizError, QuizResults};
use crate::tutor::{AnswerFeedback, Cancelled, History, QuestionView};
use crate::vocabulary::VocabularySet;

pub const MESSAGE_LIMIT: usize = 4096;
const SHOWN_MISTAKES: usize = 5;
const SHOWN_HISTORY: usize = 5;

pub const HELP: &str = "📖 <b>Помощь по командам:</b>

/start - Главное меню
/test - Тест по временам английского языка. Выберите времена и отвечайте a, b, c или d
/dialogue - Диалог в роли продавца или покупателя. Грамматика проверяется после каждого сообщения
/vocabulary - Новые слова по теме с транскрипцией и примерами
/history - История тестов и изученных слов
/cancel - Отменить текущее действие

Удачи в изучении английского! 🚀";

pub fn welcome(first_name: &str) -> String {
    format!(
        "👋 Привет, {}!

Я бот для изучения английского языка.

📝 /test - тест по временам
💬 /dialogue - диалог покупатель-продавец
📚 /vocabulary - новые слова по теме
📊 /history - история тестов и слов
ℹ️ /help - помощь

Выберите функцию:",
        escape(first_name)
    )
}

pub fn question(view: &QuestionView) -> String {
    let question = &view.question;
    let mut text = format!(
        "{}\n\n{}\n\n",
        bold(&format!("Вопрос {}/{}", question.number, view.total)),
        escape(&question.text)
    );
    for (label, option) in question.options.iter() {
        text.push_str(&format!("{}) {}\n", label, escape(option)));
    }
    text.push_str("\nВыберите вариант ответа (a, b, c или d):");
    text
}

pub fn answer_feedback(feedback: &AnswerFeedback) -> String {
    let outcome = &feedback.outcome;
    let verdict = if outcome.is_correct {
        "✅ Правильно!".to_string()
    } else {
        format!("❌ Неправильно. Правильный ответ: {}", bold(&outcome.correct_answer.to_string()))
    };
    format!("{}\n\n💡 Объяснение: {}", verdict, escape(&outcome.explanation))
}

pub fn quiz_results(results: &QuizResults) -> String {
    format!(
        "🎉 {}\n\nПравильных ответов: {}/{}\nОценка: {}%",
        bold("Тест завершён!"),
        results.correct_answers,
        results.total_questions,
        results.score
    )
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Buyer => "покупатель",
        Role::Seller => "продавец",
    }
}

pub fn dialogue_started(user_role: Role, opening: &str, max_exchanges: u32) -> String {
    let ai_role = user_role.opposite();
    format!(
        "💬 {}\n\n👤 Вы: {}\n🤖 ИИ: {}\n📊 Обменов: 0/{}\n\n{}\n{}\n\n✏️ Напишите ваш ответ на английском языке\n📝 Ваша грамматика будет проверяться\n❌ /cancel - завершить досрочно",
        bold("Диалог начат!"),
        role_name(user_role),
        role_name(ai_role),
        max_exchanges,
        bold(&format!("ИИ ({}):", role_name(ai_role))),
        escape(opening)
    )
}

pub fn grammar_feedback(grammar: &GrammarCheckResult) -> String {
    if grammar.errors_count == 0 {
        return format!("✅ {} Отлично! Ошибок нет.", bold("Грамматика:"));
    }

    let mut text = format!(
        "📝 {} Найдено ошибок: {}\n",
        bold("Проверка грамматики:"),
        grammar.errors_count
    );
    if grammar.has_correction() {
        text.push_str(&format!(
            "✏️ {} {}\n",
            bold("Исправленный вариант:"),
            italic(&escape(&grammar.corrected_text))
        ));
    }
    if !grammar.mistakes.is_empty() {
        text.push_str(&format!("\n{}\n", bold("Ошибки:")));
        for mistake in grammar.mistakes.iter().take(SHOWN_MISTAKES) {
            text.push_str(&escape(mistake));
            text.push('\n');
        }
    }
    text
}

pub fn dialogue_reply(reply: &DialogueReply, ai_role: Role) -> String {
    let speaker = match ai_role {
        Role::Buyer => "Покупатель",
        Role::Seller => "Продавец",
    };
    format!(
        "{}\n\n📊 Обмен {}/{}\n\n🤖 {}\n{}",
        grammar_feedback(&reply.grammar).trim_end(),
        reply.exchange,
        reply.max_exchanges,
        bold(&format!("{}:", speaker)),
        escape(&reply.response)
    )
}

pub fn grade(total_errors: u32) -> &'static str {
    match total_errors {
        0 => "🌟 Превосходно!",
        1..=3 => "👍 Хорошо!",
        4..=7 => "📚 Неплохо, но есть над чем работать",
        _ => "💪 Продолжайте практиковаться!",
    }
}

pub fn dialogue_stats(stats: &DialogueStats) -> String {
    let mut text = format!(
        "📊 {}\n━━━━━━━━━━━━━━━━━━━━\n💬 Всего обменов: {}\n❌ Всего ошибок: {}\n📈 Ошибок на сообщение: {:.1}\n\n{} {}\n",
        bold("СТАТИСТИКА ДИАЛОГА"),
        stats.total_exchanges,
        stats.total_errors,
        stats.errors_per_message,
        bold("Оценка:"),
        grade(stats.total_errors)
    );

    let start = stats.recent_mistakes.len().saturating_sub(SHOWN_MISTAKES);
    let recent = &stats.recent_mistakes[start..];
    if !recent.is_empty() {
        text.push_str(&format!("\n{}\n", bold("Последние ошибки для повторения:")));
        for mistake in recent {
            text.push_str(&format!("• {}\n", escape(mistake)));
        }
    }
    text
}

pub fn dialogue_finished(stats: &DialogueStats, early: bool) -> String {
    let title = if early {
        "❌ Диалог завершён досрочно"
    } else {
        "🎉 Диалог завершён!"
    };
    format!(
        "{}\n\n{}\nИспользуйте /dialogue для нового диалога или /start для главного меню.",
        bold(title),
        dialogue_stats(stats)
    )
}

pub fn vocabulary(set: &VocabularySet) -> String {
    let mut text = format!("📚 Тема: {}\n\n", bold(&escape(&set.topic)));
    for (i, entry) in set.entries.iter().enumerate() {
        text.push_str(&format!(
            "{} {} {}\n{}\n",
            bold(&format!("{}.", i + 1)),
            escape(&entry.word),
            escape(&entry.transcription),
            italic(&escape(&entry.translation))
        ));
        if !entry.example_en.is_empty() {
            text.push_str(&format!("🇬🇧 {}\n", escape(&entry.example_en)));
        }
        if !entry.example_ru.is_empty() {
            text.push_str(&format!("🇷🇺 {}\n", escape(&entry.example_ru)));
        }
        text.push('\n');
    }
    text
}

pub fn history(history: &History) -> String {
    let mut text = format!("📊 {}\n\n", bold("Ваша история:"));

    if history.tests.is_empty() {
        text.push_str("📝 Тесты ещё не пройдены\n\n");
    } else {
        text.push_str(&format!("📝 {}\n", bold("Последние тесты:")));
        for test in history.tests.iter().take(SHOWN_HISTORY) {
            text.push_str(&format!("• Оценка: {}% ({})\n", test.score, escape(&test.completed_at)));
        }
        text.push('\n');
    }

    if history.vocabulary.is_empty() {
        text.push_str("📚 Темы ещё не изучены");
    } else {
        text.push_str(&format!("📚 {}\n", bold("Изученные темы:")));
        for set in history.vocabulary.iter().take(SHOWN_HISTORY) {
            text.push_str(&format!(
                "• {}: {} слов ({})\n",
                escape(&set.topic),
                set.entries.len(),
                escape(&set.learned_at)
            ));
        }
    }
    text
}

pub fn cancelled(cancelled: &Cancelled) -> String {
    match &cancelled.dialogue {
        Some(stats) => dialogue_finished(stats, true),
        None => "❌ Действие отменено.".to_string(),
    }
}

/// What the user sees when an operation fails.
pub fn error(err: &TutorError) -> String {
    match err {
        TutorError::Generation(_) => {
            "❌ Не удалось получить ответ от ИИ. Попробуйте ещё раз.".to_string()
        }
        TutorError::ParseInsufficient { what, excerpt } => format!(
            "❌ Не удалось разобрать ответ ИИ ({}). Попробуйте ещё раз.\n\n{}",
            what,
            italic(&escape(excerpt))
        ),
        TutorError::Validation(message) => format!("⚠️ {}", escape(message)),
        TutorError::NoActiveSession(_) => {
            "Нет активного занятия. Используйте /start, чтобы начать.".to_string()
        }
        TutorError::Quiz(QuizError::InvalidLabel(_)) => {
            "Пожалуйста, выберите вариант ответа: a, b, c или d".to_string()
        }
        TutorError::Quiz(_) => "Тест не найден. Начните новый тест с /test".to_string(),
        TutorError::Storage(_) | TutorError::Encoding(_) => {
            "❌ Ошибка базы данных. Попробуйте позже.".to_string()
        }
    }
}

/// Splits `text` into messages of at most `limit` characters, breaking
/// between lines where possible.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                if piece.len() == limit {
                    chunks.push(piece.iter().collect());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}
