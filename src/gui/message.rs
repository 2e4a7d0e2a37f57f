use crate::core::db::Database;
use crate::gui::screens::{
    ScreenData, ScreenMessage, loading_page::LoadingPageScreen, scan::ScanScreen,
    select_user::SelectUserScreen,
};

#[derive(Debug, Clone)]
pub enum Message {
    LoadingPage(ScreenMessage<LoadingPageScreen>),
    SelectUser(ScreenMessage<SelectUserScreen>),
    Scan(ScreenMessage<ScanScreen>),
    ChangeScreen(ScreenData),
    DatabaseOpened(Result<Database, String>),
    /// Poll the acquisition loop.
    Tick,
}
