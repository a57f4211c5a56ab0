mod command_input;
mod form;
mod input;
mod key_result;
mod option_picker;
mod prompt;
mod search_input;

pub use command_input::{CommandEvent, CommandInput};
pub use form::{Form, FormEvent};
pub use input::{InputResult, TextInput};
pub use key_result::KeyResult;
pub use option_picker::{OptionPicker, PickerEvent};
pub use search_input::{SearchEvent, SearchInput};
