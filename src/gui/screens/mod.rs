pub mod loading_page;
pub mod scan;
pub mod select_user;

use iced::{Element, Task};

use crate::gui::{AppState, Message};
use loading_page::LoadingPageScreen;
use scan::{ScanMessage, ScanParentMessage, ScanScreen};
use select_user::{SelectUserParentMessage, SelectUserScreen};

#[derive(Debug, Clone)]
pub enum ScreenMessage<S: Screen> {
    ScreenMessage(S::Message),
    ParentMessage(S::ParentMessage),
}

pub trait Screen: Sized {
    type Message: std::fmt::Debug;
    type ParentMessage: std::fmt::Debug;
    fn view(&self) -> Element<'_, ScreenMessage<Self>>;
    fn update(&mut self, message: Self::Message, state: &mut AppState)
    -> Task<ScreenMessage<Self>>;
}

#[derive(Debug, Clone)]
pub enum ScreenData {
    LoadingPage(LoadingPageScreen),
    SelectUser(SelectUserScreen),
    Scan(ScanScreen),
}

impl ScreenData {
    fn select_user(state: &AppState) -> (Self, Task<ScreenMessage<Self>>) {
        match state.db.clone() {
            Some(db) => {
                let (screen, task) = SelectUserScreen::new(db);
                (
                    ScreenData::SelectUser(screen),
                    task.map(Message::SelectUser).map(ScreenMessage::ScreenMessage),
                )
            }
            None => (ScreenData::LoadingPage(LoadingPageScreen::default()), Task::none()),
        }
    }

    pub fn user_email(&self) -> Option<&str> {
        match self {
            ScreenData::Scan(screen) => Some(screen.user_email()),
            _ => None,
        }
    }
}

impl Screen for ScreenData {
    type Message = Message;
    type ParentMessage = std::convert::Infallible;
    fn view(&self) -> Element<'_, ScreenMessage<Self>> {
        match self {
            ScreenData::LoadingPage(screen) => screen.view().map(Message::LoadingPage),
            ScreenData::SelectUser(screen) => screen.view().map(Message::SelectUser),
            ScreenData::Scan(screen) => screen.view().map(Message::Scan),
        }
        .map(ScreenMessage::ScreenMessage)
    }

    fn update(
        &mut self,
        message: Self::Message,
        state: &mut AppState,
    ) -> Task<ScreenMessage<Self>> {
        match message {
            Message::ChangeScreen(screen) => {
                *self = screen;
                Task::none()
            }
            Message::DatabaseOpened(Ok(db)) => {
                log::info!("database opened at {}", db.location());
                state.db = Some(db);
                state.start_camera();
                let (screen, task) = Self::select_user(state);
                *self = screen;
                task
            }
            Message::DatabaseOpened(Err(error)) => {
                log::error!("failed to open database: {}", error);
                *self = ScreenData::LoadingPage(LoadingPageScreen { error: Some(error) });
                Task::none()
            }
            Message::Tick => {
                let events = state.drain_events();
                match self {
                    ScreenData::Scan(page) => Task::batch(
                        events
                            .into_iter()
                            .map(|event| page.update(ScanMessage::Acquisition(event), state))
                            .collect::<Vec<_>>(),
                    )
                    .map(Message::Scan)
                    .map(ScreenMessage::ScreenMessage),
                    _ => Task::none(),
                }
            }
            Message::LoadingPage(ScreenMessage::ScreenMessage(never))
            | Message::LoadingPage(ScreenMessage::ParentMessage(never)) => match never {},
            Message::SelectUser(ScreenMessage::ScreenMessage(msg)) => match self {
                ScreenData::SelectUser(page) => page
                    .update(msg, state)
                    .map(Message::SelectUser)
                    .map(ScreenMessage::ScreenMessage),
                _ => Task::none(),
            },
            Message::SelectUser(ScreenMessage::ParentMessage(
                SelectUserParentMessage::UserChosen(user),
            )) => {
                let Some(db) = state.db.clone() else {
                    return Task::none();
                };
                log::info!("signed in as {}", user.email);
                let controller = state.scan_controller(db.clone(), user);
                let (screen, task) = ScanScreen::new(controller, db, state.store.clone());
                *self = ScreenData::Scan(screen);
                task.map(Message::Scan).map(ScreenMessage::ScreenMessage)
            }
            Message::Scan(ScreenMessage::ScreenMessage(msg)) => match self {
                ScreenData::Scan(page) => page
                    .update(msg, state)
                    .map(Message::Scan)
                    .map(ScreenMessage::ScreenMessage),
                _ => Task::none(),
            },
            Message::Scan(ScreenMessage::ParentMessage(ScanParentMessage::SignOut)) => {
                let (screen, task) = Self::select_user(state);
                *self = screen;
                task
            }
        }
    }
}
