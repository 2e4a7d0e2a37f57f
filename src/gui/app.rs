use iced::{Element, Subscription, Task, Theme};

use crate::config::Config;
use crate::core::db::Database;
use crate::gui::{
    AppState, Message,
    screens::{Screen, ScreenData, ScreenMessage, loading_page::LoadingPageScreen},
};

pub type AppMessage = ScreenMessage<ScreenData>;

pub struct CrackcamApp {
    screen: ScreenData,
    state: AppState,
}

impl CrackcamApp {
    fn boot(config: Config) -> (Self, Task<AppMessage>) {
        let db_path = config.storage.database.clone();
        let app = Self {
            screen: ScreenData::LoadingPage(LoadingPageScreen::default()),
            state: AppState::new(config),
        };
        let open = Task::perform(
            async move { Database::open(db_path).await.map_err(|e| format!("{:#}", e)) },
            |result| ScreenMessage::ScreenMessage(Message::DatabaseOpened(result)),
        );
        (app, open)
    }

    fn title(&self) -> String {
        match self.screen.user_email() {
            Some(email) => format!("crackcam - {}", email),
            None => "crackcam".to_string(),
        }
    }

    fn update(&mut self, message: AppMessage) -> Task<AppMessage> {
        match message {
            ScreenMessage::ScreenMessage(message) => self.screen.update(message, &mut self.state),
            ScreenMessage::ParentMessage(never) => match never {},
        }
    }

    fn view(&self) -> Element<'_, AppMessage> {
        self.screen.view()
    }

    fn subscription(&self) -> Subscription<AppMessage> {
        if self.state.camera.is_some() {
            iced::time::every(self.state.frame_interval())
                .map(|_| ScreenMessage::ScreenMessage(Message::Tick))
        } else {
            Subscription::none()
        }
    }
}

impl Drop for CrackcamApp {
    fn drop(&mut self) {
        self.state.stop_camera();
    }
}

/// Open the desktop window. Blocks until it is closed.
pub fn run(config: Config) -> iced::Result {
    iced::application(
        move || CrackcamApp::boot(config.clone()),
        CrackcamApp::update,
        CrackcamApp::view,
    )
    .title(CrackcamApp::title)
    .subscription(CrackcamApp::subscription)
    .theme(Theme::Dark)
    .window_size((1100.0, 750.0))
    .run()
}
