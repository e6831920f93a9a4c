use kandybars::{PartialInstance, Rendered};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_render(template: &str, rendered: &Rendered, color: bool) {
    let palette = ansi::Palette::new(color);
    println!(
        "\n{}",
        palette.bold(palette.paint(format!("⚙  Rendered: \"{}\" ({})", template, rendered.id), ansi::CYAN))
    );

    println!("\n{}", palette.paint("━━━ Passes ━━━", ansi::GRAY));
    print_passes(rendered, &palette);

    println!("\n{}", palette.paint("━━━ Partials ━━━", ansi::GRAY));
    if rendered.partials.is_empty() {
        println!("{}", palette.dim("  No partials expanded"));
    } else {
        for partial in &rendered.partials {
            println!("  {}", fmt_partial(partial, &palette));
        }
    }

    let metrics = &rendered.metrics;
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Invocations: {}  │  Depth: {}  │  Replaced: {}",
        palette.paint(format!("{:?}", metrics.total), ansi::GREEN),
        palette.paint(metrics.invocations.to_string(), ansi::BLUE),
        palette.paint(metrics.max_depth.to_string(), ansi::BLUE),
        palette.dim(metrics.replaced().to_string()),
    );
    println!();
}

fn print_passes(rendered: &Rendered, palette: &ansi::Palette) {
    for (pass, m) in rendered.metrics.passes() {
        let label = palette.paint(format!("{:<11}", pass.name()), ansi::BLUE);
        if m.runs == 0 {
            println!("  {} {}", label, palette.dim("✗ skipped"));
            continue;
        }
        println!(
            "  {} {}  {} {}  {} {}",
            label,
            palette.dim(format!("{:?}", m.duration)),
            palette.dim("runs:"),
            palette.paint(m.runs.to_string(), ansi::YELLOW),
            palette.dim("replaced:"),
            if m.replaced > 0 {
                palette.paint(m.replaced.to_string(), ansi::GREEN)
            } else {
                palette.dim("0")
            },
        );
    }
}

fn fmt_partial(partial: &PartialInstance, palette: &ansi::Palette) -> String {
    let mut line = format!(
        "{} {} {} {}",
        palette.paint(partial.id(), ansi::YELLOW),
        palette.bold(palette.paint(partial.template(), ansi::GREEN)),
        palette.dim("│ parent:"),
        palette.paint(partial.parent(), ansi::CYAN),
    );
    if partial.has_children() {
        line.push_str(&format!(" {} {}", palette.dim("│ children:"), partial.children().join(", ")));
    }
    line
}
