use anyhow::{anyhow, Context, Result};

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [82.0 / 255.0, 82.0 / 255.0, 136.0 / 255.0, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub frames_in_flight: usize,
    pub validation: bool,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: String::from("Presenter VK"),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            validation: cfg!(debug_assertions),
            clear_color: DEFAULT_CLEAR_COLOR,
        }
    }
}

impl RendererConfig {
    /// Parses command line arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--width" => config.width = parse_value(&arg, args.next())?,
                "--height" => config.height = parse_value(&arg, args.next())?,
                "--frames-in-flight" => config.frames_in_flight = parse_value(&arg, args.next())?,
                "--title" => {
                    config.title = args
                        .next()
                        .ok_or_else(|| anyhow!("Missing value for `{arg}`."))?
                }
                "--validation" => config.validation = true,
                "--no-validation" => config.validation = false,
                other => return Err(anyhow!("Unknown argument `{other}`.")),
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "Window size must be nonzero (got {}x{}).",
                self.width,
                self.height
            ));
        }
        if self.frames_in_flight == 0 {
            return Err(anyhow!("At least one frame in flight is required."));
        }
        Ok(())
    }
}

fn parse_value<T>(flag: &str, value: Option<String>) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = value.ok_or_else(|| anyhow!("Missing value for `{flag}`."))?;
    value
        .parse()
        .with_context(|| format!("Invalid value `{value}` for `{flag}`."))
}
