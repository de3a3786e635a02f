/// How the text after a slash command is turned into `command_args`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgShape {
    /// Anything after the command is ignored.
    Bare,
    /// One path, shell-quoted when it contains spaces.
    Path(&'static str),
    /// The rest of the line, trimmed, verbatim.
    Text(&'static str),
    /// A fixed value implied by the command name itself.
    Fixed(&'static str, &'static str),
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub shape: ArgShape,
}

const fn spec(command: &'static str, action: &'static str, shape: ArgShape) -> CommandSpec {
    CommandSpec {
        command,
        action,
        shape,
    }
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    spec("chat", "set_mode", ArgShape::Fixed("mode", "chat")),
    spec("vision", "set_mode", ArgShape::Fixed("mode", "vision")),
    spec("mode", "set_mode", ArgShape::Text("mode")),
    spec("image", "select_image", ArgShape::Path("path")),
    spec("use", "select_image", ArgShape::Path("path")),
    spec("prompt", "set_vision_prompt", ArgShape::Text("text")),
    spec("analyze", "analyze", ArgShape::Bare),
    spec("history", "history", ArgShape::Bare),
    spec("status", "status", ArgShape::Bare),
    spec("model", "set_text_model", ArgShape::Text("model")),
    spec("vision_model", "set_vision_model", ArgShape::Text("model")),
    spec("models", "list_models", ArgShape::Bare),
    spec("help", "help", ArgShape::Bare),
    spec("quit", "quit", ArgShape::Bare),
    spec("exit", "quit", ArgShape::Bare),
];

pub(crate) fn lookup(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.command == command)
}

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/chat",
    "/vision",
    "/mode",
    "/image",
    "/prompt",
    "/analyze",
    "/history",
    "/status",
    "/model",
    "/vision_model",
    "/models",
    "/help",
    "/quit",
];
