#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose argument is kept verbatim under `value`.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "category",
        action: "set_category",
    },
    CommandSpec {
        command: "gender",
        action: "set_category",
    },
    CommandSpec {
        command: "mode",
        action: "set_mode",
    },
];

/// One-word shortcuts that update the preset selection directly.
pub(crate) const SELECTION_SHORTCUTS: &[(&str, &str, &str)] = &[
    ("male", "category", "male"),
    ("female", "category", "female"),
    ("professional", "mode", "professional"),
    ("fashion", "mode", "fashion"),
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "image",
        action: "set_image",
    },
    CommandSpec {
        command: "upload",
        action: "set_image",
    },
    CommandSpec {
        command: "save",
        action: "save",
    },
];

pub(crate) const PROMPT_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "custom",
    action: "custom",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate_batch",
    },
    CommandSpec {
        command: "presets",
        action: "list_presets",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "results",
        action: "status",
    },
    CommandSpec {
        command: "cancel",
        action: "cancel",
    },
    CommandSpec {
        command: "clear",
        action: "clear",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/image <path>",
    "/clear",
    "/category male|female",
    "/mode professional|fashion",
    "/male",
    "/female",
    "/professional",
    "/fashion",
    "/presets",
    "/generate",
    "/custom <prompt>",
    "/status",
    "/cancel",
    "/save [dir]",
    "/help",
    "/quit",
];
