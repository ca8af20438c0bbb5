use std::fmt::Write;

/// Builds the single instruction prompt for a batch of inputs.
#[derive(Debug, Clone, Default)]
pub struct BatchPromptBuilder {
    instructions: Option<String>,
}

impl BatchPromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task instructions placed before the numbered inputs.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        self.instructions = (!instructions.trim().is_empty()).then_some(instructions);
        self
    }

    /// Lists every input numbered from 1 and asks for a JSON array with
    /// exactly one `{"response": ...}` object per input, in order.
    pub fn build<S: AsRef<str>>(&self, inputs: &[S]) -> String {
        let count = inputs.len();
        let mut prompt = String::new();

        if let Some(instructions) = &self.instructions {
            let _ = writeln!(prompt, "{}\n", instructions.trim());
        }
        let _ = writeln!(
            prompt,
            "You will receive {count} inputs. Produce one response for each input.\n"
        );
        let _ = writeln!(prompt, "Inputs:");
        for (position, input) in inputs.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", position + 1, input.as_ref().trim());
        }
        let _ = write!(
            prompt,
            "\nReturn ONLY a JSON array with exactly {count} elements, in the same order as the inputs. \
             Each element must be an object with a single \"response\" field, for example:\n\
             [{{\"response\": \"answer to input 1\"}}, {{\"response\": \"answer to input 2\"}}]\n\
             Do not add any text before or after the array."
        );
        prompt
    }
}
