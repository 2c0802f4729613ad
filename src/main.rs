mod ai_helper;
mod config;
mod dialogue;
mod error;
mod parsing;
mod prompts;
mod quiz;
mod render;
mod sessions;
mod storage;
mod tutor;
mod vocabulary;

use std::sync::Arc;

use ai_helper::ChatGptHelper;
use config::Config;
use dialogue::Role;
use dotenv::dotenv;
use error::TutorError;
use log::{info, warn};
use quiz::TenseType;
use sessions::Sessions;
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage as _},
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode, ReplyMarkup, User},
    utils::command::BotCommands,
};
use tutor::{QuizProgress, Tutor};

type TutorDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveMenuChoice,
    ReceiveTenseChoice,
    QuizInProgress,
    ReceiveRoleChoice,
    DialogueInProgress {
        user_role: Role,
    },
    ReceiveVocabularyTopic,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
enum Command {
    #[command(description = "главное меню")]
    Start,
    #[command(description = "помощь по командам")]
    Help,
    #[command(description = "тест по временам английского языка")]
    Test,
    #[command(description = "диалог покупатель-продавец")]
    Dialogue,
    #[command(description = "новые слова по теме")]
    Vocabulary,
    #[command(description = "история тестов и слов")]
    History,
    #[command(description = "отменить текущее действие")]
    Cancel,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();

    if let Err(err) = run().await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> HandlerResult {
    let config = Config::from_env()?;
    info!("Starting english tutor bot...");

    let bot = Bot::from_env();

    let generator = Arc::new(ChatGptHelper::from_config(&config)?);
    let storage = storage::Storage::connect(&config.database_url).await?;
    let tutor = Arc::new(
        Tutor::new(generator, storage, Arc::new(Sessions::new()))
            .with_limits(config.max_exchanges, config.vocabulary_word_count),
    );

    let dialogue_storage: Arc<ErasedStorage<State>> =
        SqliteStorage::open(&config.dialogue_state_db, Json).await?.erase();
    info!("Dialogue state kept in {}", config.dialogue_state_db);

    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Could not register bot commands: {}", err);
    }

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::entry().filter_command::<Command>().endpoint(command))
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveMenuChoice].endpoint(receive_menu_choice))
            .branch(dptree::case![State::ReceiveTenseChoice].endpoint(receive_tense_choice))
            .branch(dptree::case![State::QuizInProgress].endpoint(quiz_answer))
            .branch(dptree::case![State::ReceiveRoleChoice].endpoint(receive_role_choice))
            .branch(dptree::case![State::DialogueInProgress { user_role }].endpoint(dialogue_message))
            .branch(dptree::case![State::ReceiveVocabularyTopic].endpoint(receive_vocabulary_topic)),
    )
    .dependencies(dptree::deps![dialogue_storage, tutor])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

const TEST_BUTTON: &str = "📝 Тест по грамматике";
const DIALOGUE_BUTTON: &str = "💬 Диалог";
const VOCABULARY_BUTTON: &str = "📚 Изучить слова";
const HISTORY_BUTTON: &str = "📊 История";
const HELP_BUTTON: &str = "ℹ️ Помощь";
const BACK_BUTTON: &str = "◀️ Назад";
const ALL_TENSES_BUTTON: &str = "Все времена";
const SELLER_BUTTON: &str = "👨‍💼 Я - Продавец";
const BUYER_BUTTON: &str = "🛒 Я - Покупатель";

fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(TEST_BUTTON), KeyboardButton::new(DIALOGUE_BUTTON)],
        vec![KeyboardButton::new(VOCABULARY_BUTTON), KeyboardButton::new(HISTORY_BUTTON)],
        vec![KeyboardButton::new(HELP_BUTTON)],
    ])
}

fn tense_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(ALL_TENSES_BUTTON), KeyboardButton::new("Present")],
        vec![KeyboardButton::new("Past"), KeyboardButton::new("Future")],
        vec![KeyboardButton::new(BACK_BUTTON)],
    ])
}

fn role_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(SELLER_BUTTON), KeyboardButton::new(BUYER_BUTTON)],
        vec![KeyboardButton::new(BACK_BUTTON)],
    ])
}

fn answer_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new("a"),
        KeyboardButton::new("b"),
        KeyboardButton::new("c"),
        KeyboardButton::new("d"),
    ]])
}

fn tense_choice(text: &str) -> Option<TenseType> {
    match text {
        ALL_TENSES_BUTTON => Some(TenseType::All),
        other => other.parse().ok(),
    }
}

fn role_choice(text: &str) -> Option<Role> {
    match text {
        SELLER_BUTTON => Some(Role::Seller),
        BUYER_BUTTON => Some(Role::Buyer),
        _ => None,
    }
}

/// Sends HTML text, split into as many messages as needed. The markup goes
/// with the last one.
async fn send_html(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: impl Into<ReplyMarkup>,
) -> HandlerResult {
    let markup: ReplyMarkup = markup.into();
    let chunks = render::split_message(text, render::MESSAGE_LIMIT);
    let last = chunks.len().saturating_sub(1);

    for (i, chunk) in chunks.into_iter().enumerate() {
        let request = bot.send_message(chat_id, chunk).parse_mode(ParseMode::Html);
        if i == last {
            request.reply_markup(markup.clone()).await?;
        } else {
            request.await?;
        }
    }
    Ok(())
}

async fn show_typing(bot: &Bot, chat_id: ChatId) {
    // Nothing is lost if the indicator does not show up.
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
}

async fn show_menu(bot: &Bot, dialogue: &TutorDialogue, chat_id: ChatId, text: &str) -> HandlerResult {
    send_html(bot, chat_id, text, menu_keyboard()).await?;
    dialogue.update(State::ReceiveMenuChoice).await?;
    Ok(())
}

async fn show_error(bot: &Bot, dialogue: &TutorDialogue, chat_id: ChatId, err: &TutorError) -> HandlerResult {
    info!("Request in chat {} failed: {}", chat_id, err);
    show_menu(bot, dialogue, chat_id, &render::error(err)).await
}

async fn register(tutor: &Tutor, user: &User) {
    if let Err(err) = tutor
        .register_user(user.id, user.username.as_deref(), &user.first_name)
        .await
    {
        warn!("Could not register user {}: {}", user.id, err);
    }
}

/// Stops whatever the user was doing before a new activity starts.
async fn leave_activity(bot: &Bot, tutor: &Tutor, chat_id: ChatId, user: &User) -> HandlerResult {
    let cancelled = tutor.cancel(user.id).await;
    if let Some(stats) = &cancelled.dialogue {
        send_html(bot, chat_id, &render::dialogue_finished(stats, true), KeyboardRemove::new()).await?;
    }
    Ok(())
}

async fn command(
    bot: Bot,
    dialogue: TutorDialogue,
    tutor: Arc<Tutor>,
    msg: Message,
    cmd: Command,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    match cmd {
        Command::Start => {
            leave_activity(&bot, &tutor, chat_id, user).await?;
            register(&tutor, user).await;
            show_menu(&bot, &dialogue, chat_id, &render::welcome(&user.first_name)).await
        }
        Command::Help => show_menu(&bot, &dialogue, chat_id, render::HELP).await,
        Command::Test => {
            leave_activity(&bot, &tutor, chat_id, user).await?;
            offer_tenses(&bot, &dialogue, chat_id).await
        }
        Command::Dialogue => {
            leave_activity(&bot, &tutor, chat_id, user).await?;
            offer_roles(&bot, &dialogue, chat_id, tutor.max_exchanges()).await
        }
        Command::Vocabulary => {
            leave_activity(&bot, &tutor, chat_id, user).await?;
            ask_topic(&bot, &dialogue, &tutor, chat_id, user).await
        }
        Command::History => show_history(&bot, &dialogue, &tutor, chat_id, user).await,
        Command::Cancel => {
            let cancelled = tutor.cancel(user.id).await;
            show_menu(&bot, &dialogue, chat_id, &render::cancelled(&cancelled)).await
        }
    }
}

async fn start(bot: Bot, dialogue: TutorDialogue, tutor: Arc<Tutor>, msg: Message) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    register(&tutor, user).await;
    show_menu(&bot, &dialogue, msg.chat.id, &render::welcome(&user.first_name)).await
}

async fn receive_menu_choice(
    bot: Bot,
    dialogue: TutorDialogue,
    tutor: Arc<Tutor>,
    msg: Message,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    match msg.text() {
        Some(TEST_BUTTON) => offer_tenses(&bot, &dialogue, chat_id).await,
        Some(DIALOGUE_BUTTON) => offer_roles(&bot, &dialogue, chat_id, tutor.max_exchanges()).await,
        Some(VOCABULARY_BUTTON) => ask_topic(&bot, &dialogue, &tutor, chat_id, user).await,
        Some(HISTORY_BUTTON) => show_history(&bot, &dialogue, &tutor, chat_id, user).await,
        Some(HELP_BUTTON) => show_menu(&bot, &dialogue, chat_id, render::HELP).await,
        _ => {
            bot.send_message(chat_id, "Пожалуйста, выберите один из вариантов")
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
    }
}

async fn offer_tenses(bot: &Bot, dialogue: &TutorDialogue, chat_id: ChatId) -> HandlerResult {
    bot.send_message(chat_id, "📝 Выберите времена для теста:")
        .reply_markup(tense_keyboard())
        .await?;
    dialogue.update(State::ReceiveTenseChoice).await?;
    Ok(())
}

async fn offer_roles(
    bot: &Bot,
    dialogue: &TutorDialogue,
    chat_id: ChatId,
    max_exchanges: u32,
) -> HandlerResult {
    bot.send_message(
        chat_id,
        format!(
            "💬 Выберите свою роль в диалоге:\n\n⏱️ Диалог завершится после {} обменов репликами",
            max_exchanges
        ),
    )
    .reply_markup(role_keyboard())
    .await?;
    dialogue.update(State::ReceiveRoleChoice).await?;
    Ok(())
}

async fn ask_topic(
    bot: &Bot,
    dialogue: &TutorDialogue,
    tutor: &Tutor,
    chat_id: ChatId,
    user: &User,
) -> HandlerResult {
    let mut text =
        "📚 Введите тему для изучения слов (например: food, travel, technology):".to_string();
    if let Some(last) = tutor.last_vocabulary(user.id) {
        text.push_str(&format!("\n\nПоследняя тема: {}", last.topic));
    }

    bot.send_message(chat_id, text)
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue.update(State::ReceiveVocabularyTopic).await?;
    Ok(())
}

async fn show_history(
    bot: &Bot,
    dialogue: &TutorDialogue,
    tutor: &Tutor,
    chat_id: ChatId,
    user: &User,
) -> HandlerResult {
    match tutor.history(user.id).await {
        Ok(history) => show_menu(bot, dialogue, chat_id, &render::history(&history)).await,
        Err(err) => show_error(bot, dialogue, chat_id, &err).await,
    }
}

async fn receive_tense_choice(
    bot: Bot,
    dialogue: TutorDialogue,
    tutor: Arc<Tutor>,
    msg: Message,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    let tense = match msg.text() {
        Some(BACK_BUTTON) => return show_menu(&bot, &dialogue, chat_id, "Главное меню").await,
        Some(text) => tense_choice(text),
        None => None,
    };
    let Some(tense) = tense else {
        bot.send_message(chat_id, "Пожалуйста, выберите один из вариантов")
            .reply_markup(tense_keyboard())
            .await?;
        return Ok(());
    };

    bot.send_message(chat_id, "⏳ Создаю тест... Это может занять несколько секунд.")
        .reply_markup(KeyboardRemove::new())
        .await?;
    show_typing(&bot, chat_id).await;

    match tutor.start_quiz(user.id, tense).await {
        Ok(view) => {
            send_html(&bot, chat_id, &render::question(&view), answer_keyboard()).await?;
            dialogue.update(State::QuizInProgress).await?;
            Ok(())
        }
        // Cancelled while the test was being generated.
        Err(TutorError::NoActiveSession(_)) => Ok(()),
        Err(err) => show_error(&bot, &dialogue, chat_id, &err).await,
    }
}

async fn quiz_answer(bot: Bot, dialogue: TutorDialogue, tutor: Arc<Tutor>, msg: Message) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    let feedback = match tutor.submit_answer(user.id, msg.text().unwrap_or_default()).await {
        Ok(feedback) => feedback,
        Err(err @ TutorError::Quiz(quiz::QuizError::InvalidLabel(_))) => {
            bot.send_message(chat_id, render::error(&err))
                .reply_markup(answer_keyboard())
                .await?;
            return Ok(());
        }
        Err(err) => return show_error(&bot, &dialogue, chat_id, &err).await,
    };

    match &feedback.progress {
        QuizProgress::Next(view) => {
            let text = format!(
                "{}\n\n{}",
                render::answer_feedback(&feedback),
                render::question(view)
            );
            send_html(&bot, chat_id, &text, answer_keyboard()).await
        }
        QuizProgress::Finished(results) => {
            let text = format!(
                "{}\n\n{}",
                render::answer_feedback(&feedback),
                render::quiz_results(results)
            );
            show_menu(&bot, &dialogue, chat_id, &text).await
        }
    }
}

async fn receive_role_choice(
    bot: Bot,
    dialogue: TutorDialogue,
    tutor: Arc<Tutor>,
    msg: Message,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    let user_role = match msg.text() {
        Some(BACK_BUTTON) => return show_menu(&bot, &dialogue, chat_id, "Главное меню").await,
        Some(text) => role_choice(text),
        None => None,
    };
    let Some(user_role) = user_role else {
        bot.send_message(chat_id, "Пожалуйста, выберите роль")
            .reply_markup(role_keyboard())
            .await?;
        return Ok(());
    };

    let opening = tutor.start_dialogue(user.id, user_role);
    let text = render::dialogue_started(user_role, &opening, tutor.max_exchanges());
    send_html(&bot, chat_id, &text, KeyboardRemove::new()).await?;
    dialogue.update(State::DialogueInProgress { user_role }).await?;
    Ok(())
}

async fn dialogue_message(
    bot: Bot,
    dialogue: TutorDialogue,
    tutor: Arc<Tutor>,
    user_role: Role,
    msg: Message,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let Some(text) = msg.text() else {
        bot.send_message(chat_id, "Пожалуйста, напишите сообщение на английском языке")
            .await?;
        return Ok(());
    };

    show_typing(&bot, chat_id).await;

    match tutor.send_dialogue(user.id, text).await {
        Ok(reply) => {
            let text = render::dialogue_reply(&reply, user_role.opposite());
            match &reply.stats {
                Some(stats) => {
                    send_html(&bot, chat_id, &text, KeyboardRemove::new()).await?;
                    show_menu(&bot, &dialogue, chat_id, &render::dialogue_finished(stats, false)).await
                }
                None => send_html(&bot, chat_id, &text, KeyboardRemove::new()).await,
            }
        }
        Err(err @ TutorError::Validation(_)) => {
            bot.send_message(chat_id, render::error(&err)).await?;
            Ok(())
        }
        Err(err) => show_error(&bot, &dialogue, chat_id, &err).await,
    }
}

async fn receive_vocabulary_topic(
    bot: Bot,
    dialogue: TutorDialogue,
    tutor: Arc<Tutor>,
    msg: Message,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    let topic = msg.text().map(str::trim).unwrap_or_default();
    if topic.is_empty() {
        bot.send_message(chat_id, "Пожалуйста, укажите тему для изучения слов.")
            .await?;
        return Ok(());
    }

    bot.send_message(chat_id, "⏳ Генерирую слова... Это может занять несколько секунд.")
        .await?;
    show_typing(&bot, chat_id).await;

    match tutor.generate_vocabulary(user.id, topic).await {
        Ok(set) => {
            send_html(&bot, chat_id, &render::vocabulary(&set), KeyboardRemove::new()).await?;
            show_menu(
                &bot,
                &dialogue,
                chat_id,
                "✅ Слова сохранены! Используйте /history чтобы посмотреть все изученные слова.",
            )
            .await
        }
        Err(TutorError::NoActiveSession(_)) => Ok(()),
        Err(err) => show_error(&bot, &dialogue, chat_id, &err).await,
    }
}
