use iced::{
    Color, Element, Length, Theme, border,
    widget::{button, column, container, container::Style, container::bordered_box, row, text},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    NewScan,
    PastScan,
}

impl Tab {
    pub fn title(self) -> &'static str {
        match self {
            Tab::NewScan => "New Scan",
            Tab::PastScan => "Past Scan",
        }
    }

    fn style(self, active: Self) -> impl Fn(&Theme) -> Style {
        move |theme: &Theme| {
            let style = bordered_box(theme).border(border::width(2));
            // active tab gets a darker background
            if self == active {
                let mut color_rgba = theme.palette().background.into_rgba8();
                color_rgba[0] /= 2;
                color_rgba[1] /= 2;
                color_rgba[2] /= 2;
                style.background(Color::from_rgb8(color_rgba[0], color_rgba[1], color_rgba[2]))
            } else {
                style.background(theme.palette().background)
            }
        }
    }
}

pub fn tab_bar<'a, Message>(active: Tab, on_select: impl Fn(Tab) -> Message) -> Element<'a, Message>
where
    Message: Clone + 'a,
{
    row([Tab::NewScan, Tab::PastScan].map(|tab| {
        container(button(text(tab.title())).on_press(on_select(tab)).style(button::text))
            .style(tab.style(active))
            .padding(5)
            .into()
    }))
    .spacing(5)
    .into()
}

/// Header, sidebar and main content.
pub fn layout<'a, Message>(
    header: impl Into<Element<'a, Message>>,
    sidebar: impl Into<Element<'a, Message>>,
    main_content: impl Into<Element<'a, Message>>,
) -> Element<'a, Message>
where
    Message: 'a,
{
    container(column![
        container(header.into()).padding(10),
        row![
            container(sidebar.into())
                .style(bordered_box)
                .padding(10)
                .height(Length::Fill)
                .width(Length::FillPortion(1)),
            container(main_content.into())
                .padding(10)
                .width(Length::FillPortion(3)),
        ]
        .spacing(10),
    ])
    .center_x(Length::Fill)
    .center_y(Length::Fill)
    .into()
}

/// Boxed panel drawn above the main content.
pub fn dialog<'a, Message>(content: impl Into<Element<'a, Message>>) -> Element<'a, Message>
where
    Message: 'a,
{
    container(content.into())
        .style(|theme: &Theme| bordered_box(theme).border(border::width(3)))
        .padding(20)
        .center_x(Length::Fill)
        .into()
}
