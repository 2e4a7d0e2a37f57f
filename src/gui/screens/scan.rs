use iced::{
    Element, Length, Task,
    widget::{Column, button, column, image, row, scrollable, text, text_input},
};
use time::Date;

use crate::{
    capture::AcquisitionEvent,
    core::db::{CrackStatus, Database, ImageSession, SessionRepository, group_by_day},
    core::storage::{DerivativeKind, ImageStore},
    gui::{
        AppState,
        screens::{Screen, ScreenMessage},
        widgets::{Tab, dialog, layout, tab_bar},
    },
    scan::{ClassificationOutcome, ScanController},
};

const PREVIEW_SIZE: f32 = 500.0;

#[derive(Debug, Clone)]
struct ResultDialog {
    label: String,
    crack: bool,
    probability: f32,
}

#[derive(Debug, Clone)]
pub struct ScanScreen {
    controller: ScanController,
    db: Database,
    store: ImageStore,
    tab: Tab,
    image_name: String,
    live_frame: Option<image::Handle>,
    status: Option<String>,
    sessions: Vec<ImageSession>,
    selected_day: Option<Date>,
    selected_session: Option<i64>,
    view_kind: DerivativeKind,
    result: Option<ResultDialog>,
}

#[derive(Debug, Clone)]
pub enum ScanMessage {
    SelectTab(Tab),
    ImageNameChanged(String),
    CaptureImage,
    CaptureStarted(Result<ImageSession, String>),
    Acquisition(AcquisitionEvent),
    Classified(i64, Result<ClassificationOutcome, String>),
    SessionsLoaded(Result<Vec<ImageSession>, String>),
    SelectDay(Date),
    SelectSession(i64),
    SwapView,
    DismissResult,
    SignOut,
}

#[derive(Debug, Clone)]
pub enum ScanParentMessage {
    SignOut,
}

type Msg = ScreenMessage<ScanScreen>;

fn msg(m: ScanMessage) -> Msg {
    ScreenMessage::ScreenMessage(m)
}

fn frame_handle(frame: &::image::RgbImage) -> image::Handle {
    let rgba = ::image::DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
    image::Handle::from_rgba(rgba.width(), rgba.height(), rgba.into_raw())
}

impl ScanScreen {
    pub fn new(controller: ScanController, db: Database, store: ImageStore) -> (Self, Task<Msg>) {
        let screen = Self {
            controller,
            db,
            store,
            tab: Tab::NewScan,
            image_name: String::new(),
            live_frame: None,
            status: None,
            sessions: Vec::new(),
            selected_day: None,
            selected_session: None,
            view_kind: DerivativeKind::Cropped,
            result: None,
        };
        let task = screen.load_sessions();
        (screen, task)
    }

    pub fn user_email(&self) -> &str {
        &self.controller.user().email
    }

    fn load_sessions(&self) -> Task<Msg> {
        let db = self.db.clone();
        let uuid = self.controller.user().uuid.clone();
        Task::perform(
            async move {
                db.get_sessions_for_user(&uuid)
                    .await
                    .map_err(|e| format!("{:#}", e))
            },
            |result| msg(ScanMessage::SessionsLoaded(result)),
        )
    }

    fn selected(&self) -> Option<&ImageSession> {
        let id = self.selected_session?;
        self.sessions.iter().find(|s| s.session_id == id)
    }

    fn new_scan_view(&self) -> Element<'_, Msg> {
        let video: Element<'_, Msg> = match &self.live_frame {
            Some(handle) => image(handle.clone())
                .width(Length::Fixed(PREVIEW_SIZE))
                .height(Length::Fixed(PREVIEW_SIZE))
                .into(),
            None if self.controller.camera_available() => text("Waiting for video...").into(),
            None => text("Camera unavailable").into(),
        };
        let classifying = self.controller.classifying();
        column![
            video,
            row![
                text_input("Image name", &self.image_name)
                    .on_input(|s| msg(ScanMessage::ImageNameChanged(s)))
                    .on_submit_maybe(self.controller.can_capture().then(|| msg(ScanMessage::CaptureImage)))
                    .padding(5),
                button("Capture Image").on_press_maybe(
                    self.controller
                        .can_capture()
                        .then(|| msg(ScanMessage::CaptureImage))
                ),
            ]
            .spacing(10),
            text(if classifying.is_empty() {
                String::new()
            } else {
                format!("Classifying {} capture(s)...", classifying.len())
            }),
        ]
        .spacing(10)
        .into()
    }

    fn past_scan_view(&self) -> Element<'_, Msg> {
        let grouped = group_by_day(&self.sessions);

        let dates = Column::with_children(grouped.keys().map(|day| {
            let selected = self.selected_day == Some(*day);
            button(text(day.to_string()))
                .width(Length::Fill)
                .style(if selected { button::primary } else { button::secondary })
                .on_press(msg(ScanMessage::SelectDay(*day)))
                .into()
        }))
        .spacing(5);

        let day_sessions = self
            .selected_day
            .and_then(|day| grouped.get(&day).cloned())
            .unwrap_or_default();
        let sessions = Column::with_children(day_sessions.into_iter().map(|session| {
            let selected = self.selected_session == Some(session.session_id);
            button(text(session.label()))
                .width(Length::Fill)
                .style(if selected { button::primary } else { button::secondary })
                .on_press(msg(ScanMessage::SelectSession(session.session_id)))
                .into()
        }))
        .spacing(5);

        let preview: Element<'_, Msg> = match self.selected() {
            Some(session) if session.crack_status == CrackStatus::Pending => {
                text("This capture has not been classified.").into()
            }
            Some(session) => {
                let path = self.store.derivative_path(
                    &session.user_uuid,
                    session.session_id,
                    self.view_kind,
                );
                column![
                    image(image::Handle::from_path(path))
                        .width(Length::Fixed(PREVIEW_SIZE))
                        .height(Length::Fixed(PREVIEW_SIZE)),
                    button(text(format!("Show {}", self.view_kind.toggled().label())))
                        .on_press(msg(ScanMessage::SwapView)),
                ]
                .spacing(10)
                .into()
            }
            None => text("Select a scan").into(),
        };

        row![
            column![
                text("Dates"),
                scrollable(dates).height(Length::FillPortion(1)),
                text("Scans"),
                scrollable(sessions).height(Length::FillPortion(2)),
            ]
            .spacing(5)
            .width(Length::FillPortion(1)),
            preview,
        ]
        .spacing(10)
        .into()
    }
}

impl Screen for ScanScreen {
    type Message = ScanMessage;
    type ParentMessage = ScanParentMessage;

    fn view(&self) -> Element<'_, ScreenMessage<Self>> {
        let header = row![
            tab_bar(self.tab, |tab| msg(ScanMessage::SelectTab(tab))),
            text(format!("Signed in as {}", self.controller.user().email)),
            button("Change User")
                .style(button::secondary)
                .on_press_maybe((!self.controller.is_busy()).then(|| msg(ScanMessage::SignOut))),
        ]
        .spacing(20);

        let mut sidebar = Column::new().spacing(10);
        if let Some(result) = &self.result {
            sidebar = sidebar.push(dialog(
                column![
                    text(if result.crack { "Crack detected" } else { "No crack detected" }).size(20),
                    text(result.label.as_str()),
                    text(format!("probability {:.2}", result.probability)),
                    button("OK").on_press(msg(ScanMessage::DismissResult)),
                ]
                .spacing(10),
            ));
        }
        if let Some(status) = &self.status {
            sidebar = sidebar.push(text(status.as_str()));
        }

        let main_content = match self.tab {
            Tab::NewScan => self.new_scan_view(),
            Tab::PastScan => self.past_scan_view(),
        };
        layout(header, sidebar, main_content)
    }

    fn update(
        &mut self,
        message: Self::Message,
        _state: &mut AppState,
    ) -> Task<ScreenMessage<Self>> {
        match message {
            ScanMessage::SelectTab(tab) => {
                self.tab = tab;
                if tab == Tab::PastScan {
                    return self.load_sessions();
                }
                Task::none()
            }
            ScanMessage::ImageNameChanged(name) => {
                self.image_name = name;
                Task::none()
            }
            ScanMessage::CaptureImage => {
                let controller = self.controller.clone();
                let name = std::mem::take(&mut self.image_name);
                Task::perform(
                    async move {
                        let name = Some(name.trim()).filter(|n| !n.is_empty());
                        controller
                            .begin_capture(name)
                            .await
                            .map_err(|e| format!("{:#}", e))
                    },
                    |result| msg(ScanMessage::CaptureStarted(result)),
                )
            }
            ScanMessage::CaptureStarted(Ok(session)) => {
                self.status = Some(format!("Capturing scan {}", session.session_id));
                Task::none()
            }
            ScanMessage::CaptureStarted(Err(e)) => {
                self.status = Some(e);
                Task::none()
            }
            ScanMessage::Acquisition(event) => {
                match &event {
                    AcquisitionEvent::Frame(frame) => {
                        self.live_frame = Some(frame_handle(frame));
                    }
                    AcquisitionEvent::Error(e) => self.status = Some(e.clone()),
                    AcquisitionEvent::CaptureFailed { reason, .. } => {
                        self.status = Some(format!("Capture failed: {}", reason))
                    }
                    AcquisitionEvent::CameraAvailable(false) => self.live_frame = None,
                    _ => {}
                }
                match self.controller.on_event(&event) {
                    Some(session_id) => {
                        self.status = Some(format!("Classifying scan {}", session_id));
                        let controller = self.controller.clone();
                        Task::perform(
                            async move {
                                controller
                                    .classify(session_id)
                                    .await
                                    .map_err(|e| format!("{:#}", e))
                            },
                            move |result| msg(ScanMessage::Classified(session_id, result)),
                        )
                    }
                    None => Task::none(),
                }
            }
            ScanMessage::Classified(_, Ok(outcome)) => {
                self.status = None;
                self.result = Some(ResultDialog {
                    label: outcome.session.label(),
                    crack: outcome.verdict.crack,
                    probability: outcome.verdict.probability,
                });
                self.load_sessions()
            }
            ScanMessage::Classified(session_id, Err(e)) => {
                self.status = Some(format!("Scan {} could not be classified: {}", session_id, e));
                self.load_sessions()
            }
            ScanMessage::SessionsLoaded(Ok(sessions)) => {
                self.sessions = sessions;
                if self.selected_day.is_none() {
                    self.selected_day = self.sessions.last().map(ImageSession::day);
                }
                Task::none()
            }
            ScanMessage::SessionsLoaded(Err(e)) => {
                self.status = Some(e);
                Task::none()
            }
            ScanMessage::SelectDay(day) => {
                self.selected_day = Some(day);
                self.selected_session = None;
                Task::none()
            }
            ScanMessage::SelectSession(id) => {
                self.selected_session = Some(id);
                if let Some(session) = self.selected() {
                    self.view_kind = DerivativeKind::for_status(session.crack_status);
                }
                Task::none()
            }
            ScanMessage::SwapView => {
                self.view_kind = self.view_kind.toggled();
                Task::none()
            }
            ScanMessage::DismissResult => {
                self.result = None;
                Task::none()
            }
            // Events for this user's captures only reach this screen
            ScanMessage::SignOut if self.controller.is_busy() => {
                self.status = Some("Wait for the current scan to finish".to_string());
                Task::none()
            }
            ScanMessage::SignOut => Task::done(ScreenMessage::ParentMessage(ScanParentMessage::SignOut)),
        }
    }
}
