use std::convert::Infallible;

use iced::{
    Element, Task,
    widget::{column, container, text},
};

use crate::gui::{
    AppState,
    screens::{Screen, ScreenMessage},
};

#[derive(Debug, Clone, Default)]
pub struct LoadingPageScreen {
    pub error: Option<String>,
}

impl Screen for LoadingPageScreen {
    type Message = Infallible;
    type ParentMessage = Infallible;

    fn view(&self) -> Element<'_, ScreenMessage<Self>> {
        let content = match &self.error {
            None => column![text("Loading...")],
            Some(error) => column![
                text("Failed to open the database").size(24),
                text(error.as_str()),
            ]
            .spacing(10),
        };
        container(content)
            .center_x(iced::Length::Fill)
            .center_y(iced::Length::Fill)
            .into()
    }

    fn update(
        &mut self,
        message: Self::Message,
        _state: &mut AppState,
    ) -> Task<ScreenMessage<Self>> {
        match message {}
    }
}
