use iced::{
    Alignment::Center,
    Element, Length, Task,
    widget::{Column, button, column, container, row, scrollable, text, text_input},
};

use crate::{
    core::db::{Database, NewUser, User, UserRepository},
    gui::{
        AppState,
        screens::{Screen, ScreenMessage},
        widgets::dialog,
    },
};

#[derive(Debug, Clone)]
pub struct SelectUserScreen {
    db: Database,
    users: Vec<User>,
    selected: Option<String>,
    form: Option<NewUser>,
    alert: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SelectUserMessage {
    UsersLoaded(Result<Vec<User>, String>),
    Select(String),
    OpenCreateForm,
    CancelCreate,
    FirstNameChanged(String),
    LastNameChanged(String),
    EmailChanged(String),
    SubmitCreate,
    Created(Result<User, String>),
    DismissAlert,
    SetUser,
}

#[derive(Debug, Clone)]
pub enum SelectUserParentMessage {
    UserChosen(User),
}

type Msg = ScreenMessage<SelectUserScreen>;

impl SelectUserScreen {
    pub fn new(db: Database) -> (Self, Task<Msg>) {
        let screen = Self {
            db,
            users: Vec::new(),
            selected: None,
            form: None,
            alert: None,
        };
        let task = screen.load_users();
        (screen, task)
    }

    fn load_users(&self) -> Task<Msg> {
        let db = self.db.clone();
        Task::perform(
            async move { db.get_users().await.map_err(|e| format!("{:#}", e)) },
            |result| ScreenMessage::ScreenMessage(SelectUserMessage::UsersLoaded(result)),
        )
    }

    fn form_mut(&mut self) -> &mut NewUser {
        self.form.get_or_insert_with(NewUser::default)
    }

    fn user_list(&self) -> Element<'_, Msg> {
        let entries = self.users.iter().map(|user| {
            let selected = self.selected.as_deref() == Some(user.uuid.as_str());
            button(text(user.email.as_str()))
                .width(Length::Fill)
                .style(if selected { button::primary } else { button::secondary })
                .on_press(ScreenMessage::ScreenMessage(SelectUserMessage::Select(
                    user.uuid.clone(),
                )))
                .into()
        });
        scrollable(Column::with_children(entries).spacing(5))
            .height(Length::Fixed(300.0))
            .into()
    }

    fn create_form<'a>(&'a self, form: &'a NewUser) -> Element<'a, Msg> {
        let field = |placeholder: &'static str, value: &'a str, on_input: fn(String) -> SelectUserMessage| {
            text_input(placeholder, value)
                .on_input(move |s| ScreenMessage::ScreenMessage(on_input(s)))
                .padding(5)
        };
        column![
            text("Create User").size(20),
            field("First Name", &form.first_name, SelectUserMessage::FirstNameChanged),
            field("Last Name", &form.last_name, SelectUserMessage::LastNameChanged),
            field("Email", &form.email, SelectUserMessage::EmailChanged)
                .on_submit(ScreenMessage::ScreenMessage(SelectUserMessage::SubmitCreate)),
            row![
                button("Create").on_press(ScreenMessage::ScreenMessage(SelectUserMessage::SubmitCreate)),
                button("Cancel")
                    .style(button::secondary)
                    .on_press(ScreenMessage::ScreenMessage(SelectUserMessage::CancelCreate)),
            ]
            .spacing(10),
        ]
        .spacing(10)
        .into()
    }
}

impl Screen for SelectUserScreen {
    type Message = SelectUserMessage;
    type ParentMessage = SelectUserParentMessage;

    fn view(&self) -> Element<'_, ScreenMessage<Self>> {
        let mut content = Column::new().spacing(15).padding(20).max_width(500.0).align_x(Center);
        content = content.push(text("Select User").size(32));

        if let Some(alert) = &self.alert {
            content = content.push(dialog(
                column![
                    text(alert.as_str()),
                    button("OK").on_press(ScreenMessage::ScreenMessage(SelectUserMessage::DismissAlert)),
                ]
                .spacing(10),
            ));
        }

        content = content.push(self.user_list());

        match &self.form {
            Some(form) => content = content.push(self.create_form(form)),
            None => {
                content = content.push(
                    row![
                        button("Create User")
                            .style(button::secondary)
                            .on_press(ScreenMessage::ScreenMessage(SelectUserMessage::OpenCreateForm)),
                        button("Set User").on_press_maybe(
                            self.selected
                                .as_ref()
                                .map(|_| ScreenMessage::ScreenMessage(SelectUserMessage::SetUser)),
                        ),
                    ]
                    .spacing(10),
                )
            }
        }

        container(content).center_x(Length::Fill).into()
    }

    fn update(
        &mut self,
        message: Self::Message,
        _state: &mut AppState,
    ) -> Task<ScreenMessage<Self>> {
        match message {
            SelectUserMessage::UsersLoaded(Ok(users)) => {
                self.users = users;
                Task::none()
            }
            SelectUserMessage::UsersLoaded(Err(e)) | SelectUserMessage::Created(Err(e)) => {
                self.alert = Some(e);
                Task::none()
            }
            SelectUserMessage::Select(uuid) => {
                self.selected = Some(uuid);
                Task::none()
            }
            SelectUserMessage::OpenCreateForm => {
                self.form = Some(NewUser::default());
                Task::none()
            }
            SelectUserMessage::CancelCreate => {
                self.form = None;
                Task::none()
            }
            SelectUserMessage::FirstNameChanged(value) => {
                self.form_mut().first_name = value;
                Task::none()
            }
            SelectUserMessage::LastNameChanged(value) => {
                self.form_mut().last_name = value;
                Task::none()
            }
            SelectUserMessage::EmailChanged(value) => {
                self.form_mut().email = value;
                Task::none()
            }
            SelectUserMessage::SubmitCreate => {
                let Some(form) = self.form.clone() else {
                    return Task::none();
                };
                let missing = form.missing_fields();
                if !missing.is_empty() {
                    self.alert = Some(format!("Missing Field(s): {}", missing.join(" | ")));
                    return Task::none();
                }
                let db = self.db.clone();
                Task::perform(
                    async move { db.add_user(form).await.map_err(|e| format!("{:#}", e)) },
                    |result| ScreenMessage::ScreenMessage(SelectUserMessage::Created(result)),
                )
            }
            SelectUserMessage::Created(Ok(user)) => {
                self.form = None;
                self.alert = None;
                self.selected = Some(user.uuid.clone());
                self.load_users()
            }
            SelectUserMessage::DismissAlert => {
                self.alert = None;
                Task::none()
            }
            SelectUserMessage::SetUser => {
                let chosen = self
                    .selected
                    .as_ref()
                    .and_then(|uuid| self.users.iter().find(|u| &u.uuid == uuid))
                    .cloned();
                match chosen {
                    Some(user) => Task::done(ScreenMessage::ParentMessage(
                        SelectUserParentMessage::UserChosen(user),
                    )),
                    None => Task::none(),
                }
            }
        }
    }
}
