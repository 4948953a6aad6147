//! Console command catalog expressed as a small grammar AST.
//!
//! The parser walks these nodes and the `help` command renders the same
//! entries, so keywords and usage strings cannot drift apart.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Assign,
    Run,
    Status,
    Describe,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub usage: &'static str,
    pub summary: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    /// Unsigned actuator identifier.
    Actuator { next: &'static Node },
    /// One time value (`30`, `30s`, `1500ms`, `2m`).
    Duration { next: &'static Node },
    /// At least `min` time values, optionally comma separated.
    Durations { min: usize, next: &'static Node },
    /// Optional free-form help topic.
    Topic { next: &'static Node },
}

const END: Node = Node::End;

const ASSIGN_DURATIONS: Node = Node::Durations {
    min: 1,
    next: &END,
};

const ASSIGN_GRAMMAR: Node = Node::Actuator {
    next: &ASSIGN_DURATIONS,
};

const RUN_GRAMMAR: Node = Node::Duration { next: &END };

const HELP_GRAMMAR: Node = Node::Topic { next: &END };

const COMMANDS: [CommandSpec; 5] = [
    CommandSpec {
        name: "assign",
        tag: CommandTag::Assign,
        grammar: &ASSIGN_GRAMMAR,
        usage: "assign <actuator> <duration>...",
        summary: "append a fixed-time item with one stage per duration",
    },
    CommandSpec {
        name: "run",
        tag: CommandTag::Run,
        grammar: &RUN_GRAMMAR,
        usage: "run <duration>",
        summary: "advance simulated time, delivering controller pokes",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        usage: "status",
        summary: "show controller state and lit phases",
    },
    CommandSpec {
        name: "describe",
        tag: CommandTag::Describe,
        grammar: &END,
        usage: "describe",
        summary: "dump actuators and controller configuration",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        usage: "help [command]",
        summary: "list commands or show usage for one",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub const fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Assign => &COMMANDS[0],
        CommandTag::Run => &COMMANDS[1],
        CommandTag::Status => &COMMANDS[2],
        CommandTag::Describe => &COMMANDS[3],
        CommandTag::Help => &COMMANDS[4],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}
